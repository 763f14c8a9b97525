mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use core::time::Duration;
    use std::sync::Arc;
    use ethercycle::{
        EthercatError, AlState, Session,
        cyclic,
        sim::SimCall,
        };

    #[test]
    fn deactivation() {
        init_logs();
        let clock = clock();
        let session = session(bus().with_deactivation_delay(3), clock.clone()).unwrap();
        session.activate().unwrap();
        session.cycle();
        assert!(session.operational_status());
        assert_eq!(session.application_layer_states(), 0x08);

        let start = clock.peek();
        session.deactivate();
        assert!(clock.peek() - start >= Duration::from_micros(1500));
        assert!(! session.is_active());
        assert!(! session.is_operational());
        assert!(! session.operational_status());

        let calls = session.driver().calls();
        assert_eq!(&calls[calls.len() - 2 ..], &[SimCall::Deactivate, SimCall::Release]);
        // nothing more is released on drop
        let bus = session.driver().clone();
        drop(session);
        assert_eq!(bus.calls().iter().filter(|call| **call == SimCall::Release).count(), 1);
    }

    #[test]
    fn release_without_activation() {
        init_logs();
        let bus = bus();
        drop(session(bus.clone(), clock()).unwrap());
        let calls = bus.calls();
        assert_eq!(calls.last(), Some(&SimCall::Release));
        assert!(! calls.contains(&SimCall::Deactivate));
    }

    #[test]
    fn state_refresh_decimation() {
        init_logs();
        let mut config = config();
        config.set_frequency(4);
        let session = Session::new(bus().with_manual_states(), clock(), config, entries(), Vec::new()).unwrap();
        session.activate().unwrap();

        let data = session.cycle();
        assert!(! session.is_operational());
        assert!(data.slots.is_empty());
        assert!(data.states.pre_operational());

        session.driver().set_slave_state(2, AlState::Operational);
        for _ in 0 .. 3 {
            assert!(session.cycle().slots.is_empty());
        }
        assert!(! session.is_operational());
        let data = session.cycle();
        assert!(session.is_operational());
        assert!(session.operational_status());
        assert_eq!(data.slots.len(), 2);
        assert_eq!(session.driver().cycles(), 5);
    }

    #[test]
    fn lost_slave() {
        init_logs();
        let mut config = config();
        config.set_frequency(1);
        let session = Session::new(bus(), clock(), config, entries(), Vec::new()).unwrap();
        session.activate().unwrap();
        session.cycle();
        assert!(session.operational_status());

        session.driver().set_slave_online(2, false);
        session.cycle();
        assert!(! session.is_operational());
        assert_eq!(session.master_state().slaves_responding, 0);
        assert!(! session.slaves()[0].state().online);
    }

    #[test]
    fn cyclic_task() {
        init_logs();
        let session = Arc::new(session(bus().with_manual_states(), clock()).unwrap());
        let (task, mut data) = cyclic::start(session.clone()).unwrap();
        assert!(session.is_active());

        // nothing is exchanged before the slaves reach operational state
        let first = data.blocking_recv().unwrap();
        assert!(first.slots.is_empty());
        assert!(first.states.pre_operational());

        session.driver().set_slave_state(2, AlState::Operational);
        let mut exchanged = None;
        while exchanged.is_none() {
            let next = data.blocking_recv().unwrap();
            if ! next.slots.is_empty()
                {exchanged = Some(next)}
        }
        let exchanged = exchanged.unwrap();
        assert_eq!(exchanged.slots.len(), 2);
        assert_eq!((exchanged.slots[0].position, exchanged.slots[0].index, exchanged.slots[0].subindex), (2, 0x7000, 1));
        assert!(exchanged.states.operational());

        session.domain_write(2, 0x7000, 1, 9).unwrap();
        let written = loop {
            let next = data.blocking_recv().unwrap();
            if next.slots[0].value.map(|v| v.raw()) == Some(9)
                {break next}
        };
        assert_eq!(written.slots[0].bitsize, 8);

        task.stop();
        while data.blocking_recv().is_some() {}
        task.join().unwrap();
        assert!(! session.is_active());
        assert_eq!(session.driver().calls().last(), Some(&SimCall::Release));
    }

    #[test]
    fn deactivation_ends_task() {
        init_logs();
        let session = Arc::new(session(bus(), clock()).unwrap());
        let (task, mut data) = cyclic::start(session.clone()).unwrap();
        data.blocking_recv().unwrap();

        session.deactivate();
        let cycles = session.driver().cycles();
        while data.blocking_recv().is_some() {}
        task.join().unwrap();

        // nothing reaches the driver once the master is released
        assert_eq!(session.driver().cycles(), cycles);
        let calls = session.driver().calls();
        assert_eq!(calls.last(), Some(&SimCall::Release));
        assert_eq!(calls.iter().filter(|call| **call == SimCall::Release).count(), 1);
        assert!(! session.driver().is_active());
    }

    #[test]
    fn dropped_receiver() {
        init_logs();
        let session = Arc::new(session(bus(), clock()).unwrap());
        let (task, data) = cyclic::start(session.clone()).unwrap();
        drop(data);
        match task.join() {
            Err(EthercatError::Master(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
        assert!(! session.is_active());
        assert!(session.driver().calls().contains(&SimCall::Deactivate));
    }
}
