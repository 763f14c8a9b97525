mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use core::time::Duration;
    use ethercycle::{
        EthercatError, SdoError, AlState,
        sim::SdoBehavior,
        };

    #[test]
    fn parameter_read_write() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        session.driver().set_object(2, 0x1018, 1, &VENDOR.to_le_bytes());

        assert_eq!(session.parameter_read_as::<u32>(2, 0x1018, 1).unwrap(), VENDOR);
        session.parameter_write_as(2, 0x8000, 1, 500u16).unwrap();
        assert_eq!(session.driver().object(2, 0x8000, 1), Some(vec![0xf4, 0x01]));

        let buffer = session.parameter_read(2, 0x8000, 1, 2, Duration::from_millis(10)).unwrap();
        assert_eq!(buffer.as_slice(), &[0xf4, 0x01]);
        // one request per transfer
        assert_eq!(session.driver().requests_created(), 3);
    }

    #[test]
    fn busy_then_done() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        session.driver().set_object(2, 0x6041, 0, &0x0237u16.to_le_bytes());
        session.driver().set_behavior(2, SdoBehavior::BusyFor(3));
        assert_eq!(session.parameter_read_as::<u16>(2, 0x6041, 0).unwrap(), 0x0237);
    }

    #[test]
    fn unused_request_is_triggered_again() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        session.driver().set_behavior(2, SdoBehavior::UnusedOnce);
        session.parameter_write_as(2, 0x8000, 2, 7u8).unwrap();
        assert_eq!(session.driver().object(2, 0x8000, 2), Some(vec![7]));
    }

    #[test]
    fn timeout_bound() {
        init_logs();
        let clock = clock();
        let session = session(bus(), clock.clone()).unwrap();
        session.driver().set_behavior(2, SdoBehavior::BusyForever);

        let timeout = Duration::from_millis(10);
        let start = clock.peek();
        match session.parameter_read(2, 0x6041, 0, 2, timeout) {
            Err(EthercatError::Timeout(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
        let elapsed = clock.peek() - start;
        assert!(elapsed > timeout);
        // the clock steps 1ms at each poll
        assert!(elapsed <= timeout + Duration::from_millis(3));
    }

    #[test]
    fn unused_request_timeout() {
        init_logs();
        let clock = clock();
        let session = session(bus(), clock.clone()).unwrap();
        session.driver().set_behavior(2, SdoBehavior::UnusedForever);

        let timeout = Duration::from_millis(10);
        let start = clock.peek();
        match session.parameter_write(2, 0x8000, 1, &[1, 2], timeout) {
            Err(EthercatError::Timeout(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
        assert!(clock.peek() - start <= timeout + Duration::from_millis(3));
        assert_eq!(session.driver().object(2, 0x8000, 1), None);
    }

    #[test]
    fn request_failures() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        match session.parameter_read_as::<u32>(9, 0x1018, 1) {
            Err(EthercatError::Slave(SdoError::SlaveNotFound)) => {},
            other => panic!("unexpected {:?}", other),
        }
        // object missing from the dictionary
        match session.parameter_read_as::<u32>(2, 0x1018, 1) {
            Err(EthercatError::Slave(SdoError::Failed)) => {},
            other => panic!("unexpected {:?}", other),
        }
        session.driver().set_behavior(2, SdoBehavior::Abort(0x0601_0002));
        match session.parameter_write_as(2, 0x1018, 1, 1u32) {
            Err(EthercatError::Slave(SdoError::Failed)) => {},
            other => panic!("unexpected {:?}", other),
        }

        session.driver().set_behavior(2, SdoBehavior::Immediate);
        session.driver().set_slave_state(2, AlState::Init);
        let created = session.driver().requests_created();
        match session.parameter_read_as::<u32>(2, 0x1018, 1) {
            Err(EthercatError::Slave(SdoError::SlaveNotReady(AlState::Init))) => {},
            other => panic!("unexpected {:?}", other),
        }
        assert_eq!(session.driver().requests_created(), created);
        assert!(session.parameter_read(2, 0x1018, 1, 300, Duration::from_millis(1)).is_err());
    }

    #[test]
    fn direct_transfers() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        session.sdo_write(2, 0x8010, 3, -20i16).unwrap();
        assert_eq!(session.sdo_read::<i16>(2, 0x8010, 3).unwrap(), -20);

        session.driver().set_object(2, 0x1008, 0, b"EL2004\0\0");
        assert_eq!(session.sdo_read_string(2, 0x1008, 0, 32).unwrap(), "EL2004");

        match session.sdo_read::<u32>(2, 0x1018, 9) {
            Err(EthercatError::Slave(error)) => {
                assert_eq!(error, SdoError::Aborted(0x0602_0000));
                assert_eq!(error.reason(), Some("This object does not exist in the object directory"));
            },
            other => panic!("unexpected {:?}", other),
        }
        session.driver().set_behavior(2, SdoBehavior::Abort(0x0601_0002));
        match session.sdo_write(2, 0x1018, 1, 0u32) {
            Err(EthercatError::Slave(SdoError::Aborted(0x0601_0002))) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn concurrent_requests() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        session.driver().set_behavior(2, SdoBehavior::BusyFor(2));
        std::thread::scope(|scope| {
            let tasks = (0 .. 4).map(|i| {
                let session = &session;
                scope.spawn(move || session.parameter_write_as(2, 0x8000, i, u16::from(i)))
                }).collect::<Vec<_>>();
            for task in tasks
                {task.join().unwrap().unwrap()}
        });
        for i in 0 .. 4 {
            assert_eq!(session.driver().object(2, 0x8000, i), Some(u16::from(i).to_le_bytes().to_vec()));
        }
    }
}
