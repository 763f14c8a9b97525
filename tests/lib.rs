#[cfg(test)]
mod tests {
    use ethercycle::{
        EthercatError, ConfigError, SdoError, AlState, AlMixedState, Value, PduData,
        SdoAbortCode, DomainKey, StartupParameter,
        data,
        };

    #[test]
    fn display_ethercaterr_fmt() {
        let err_master: EthercatError<&'static str> = EthercatError::Master("Master not found");
        let err_proto: EthercatError<&'static str> = EthercatError::Protocol("Protocol incompatible");
        let err_timer: EthercatError<&'static str> = EthercatError::Timeout("request timeout");
        let err_io: EthercatError = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found").into();

        assert!(format!("{}", err_master).contains("Master not found"));
        assert!(err_proto.to_string().starts_with("protocol error"));
        assert_eq!(err_timer.to_string(), "timeout: request timeout");
        assert!(format!("{}", err_io).contains("File not found"));
    }

    #[test]
    fn error_context() {
        let unspecified: EthercatError = EthercatError::Slave(());
        assert_eq!(
            unspecified.context(ConfigError::Domain).to_string(),
            EthercatError::Slave(ConfigError::Domain).to_string(),
            );
        match EthercatError::<()>::Timeout("late").context(ConfigError::Domain) {
            EthercatError::Timeout(message) => assert_eq!(message, "late"),
            other => panic!("unexpected {:?}", other),
        }
        match EthercatError::<()>::Slave(()).upgrade::<SdoError>() {
            EthercatError::Master(_) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn abort_reason() {
        assert_eq!(
            SdoError::Aborted(0x0602_0000).reason(),
            Some("This object does not exist in the object directory"),
            );
        assert_eq!(SdoError::Aborted(0x1234_5678).reason(), None);
        assert_eq!(SdoError::Failed.reason(), None);

        let code = SdoAbortCode::try_from(0x0601_0002u32).unwrap();
        assert_eq!(code, SdoAbortCode::ReadOnly);
        assert!(code.object_related());
        assert!(! code.device_related());
    }

    #[test]
    fn al_states() {
        assert_eq!(AlState::from_code(0x12), Some(AlState::PreOperational));
        assert_eq!(AlState::from_code(0), None);
        assert_eq!(AlState::Operational.code(), 8);

        let mixed = AlMixedState::from_bits(0x0a);
        assert!(mixed.pre_operational());
        assert!(mixed.operational());
        assert!(! mixed.init());
        assert_eq!(mixed.bits(), 0x0a);
        assert_eq!(AlMixedState::from(AlState::SafeOperational).bits(), 4);
        assert_eq!(AlMixedState::default().bits(), 0);
    }

    #[test]
    fn swap_sizes() {
        assert_eq!(data::swap(0x3412, 16), 0x1234);
        assert_eq!(data::swap(0x7856_3412, 32), 0x1234_5678);
        assert_eq!(data::swap(0x0807_0605_0403_0201, 64), 0x0102_0304_0506_0708);
        assert_eq!(data::swap(0x12, 8), 0x12);
        assert_eq!(data::swap(1, 1), 1);
        assert!(data::supported(64));
        assert!(! data::supported(12));
    }

    #[test]
    fn slot_values() {
        assert_eq!(Value::new(0xff, 8, true), Some(Value::I8(-1)));
        assert_eq!(Value::new(0xff, 8, false), Some(Value::U8(255)));
        assert_eq!(Value::new(0xfffe, 16, true).map(|v| v.as_i64()), Some(-2));
        assert_eq!(Value::new(3, 1, false), Some(Value::Bit(true)));
        assert_eq!(Value::new(3, 12, false), None);
        assert_eq!(Value::I16(-2).raw(), 0xfffe);
        assert_eq!(Value::I32(-5).to_string(), "-5");

        assert_eq!(i16::from_raw((-300i16).to_raw()), -300);
        assert_eq!(f32::from_raw(1.5f32.to_raw()), 1.5);
        let mut buffer = [0; 4];
        0x1234_5678u32.pack(&mut buffer).unwrap();
        assert_eq!(buffer, [0x78, 0x56, 0x34, 0x12]);
        assert!(u32::unpack(&buffer[.. 2]).is_err());
    }

    #[test]
    fn startup_parameter_bytes() {
        let parameter = |bitsize| StartupParameter {position: 0, index: 0x8000, subindex: 1, bitsize, value: 0x0102_0304};
        assert_eq!(parameter(8).bytes().as_slice(), &[0x04]);
        assert_eq!(parameter(16).bytes().as_slice(), &[0x04, 0x03]);
        assert_eq!(parameter(32).bytes().as_slice(), &[0x04, 0x03, 0x02, 0x01]);
        assert_eq!(parameter(24).bytes().len(), 4);
    }

    #[test]
    fn domain_key_display() {
        let key = DomainKey::from((2, 0x7000, 1));
        assert_eq!(key, DomainKey::new(2, 0x7000, 1));
        assert_eq!(key.to_string(), "2:0x7000:0x01");
        assert!(DomainKey::new(1, 0xffff, 0xff) < DomainKey::new(2, 0, 0));
    }
}
