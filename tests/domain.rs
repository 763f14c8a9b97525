mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use ethercycle::{
        EthercatError, ConfigError, DomainError, DomainKey, SignalEntry, Session, Value,
        SyncDirection,
        };

    #[test]
    fn process_image_exchange() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        session.activate().unwrap();
        session.cycle();
        assert!(session.is_operational());

        session.domain_write(2, 0x7000, 1, 5).unwrap();
        let input = session.domain().slot(DomainKey::new(2, 0x6000, 1)).unwrap();
        session.driver().write_image(input.offset, &[0x12, 0x34]);
        let data = session.cycle();

        // the input is big-endian on the bus
        assert_eq!(session.domain_read(2, 0x6000, 1), Ok(Value::U16(0x1234)));
        assert_eq!(session.domain_read_as::<u16>(2, 0x6000, 1), Ok(0x1234));
        let output = session.domain().slot(DomainKey::new(2, 0x7000, 1)).unwrap();
        assert_eq!(session.driver().read_image(output.offset, 1), vec![5]);
        assert_eq!(session.domain_read(2, 0x7000, 1), Ok(Value::U8(5)));

        assert_eq!(data.slots.len(), 2);
        assert_eq!(data.slots[1].value, Some(Value::U16(0x1234)));
        assert!(data.states.operational());

        // reading does not consume the value
        assert_eq!(session.domain_read(2, 0x6000, 1), session.domain_read(2, 0x6000, 1));
    }

    #[test]
    fn slot_lookup() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        let domain = session.domain();
        assert_eq!(domain.len(), 2);
        for (i, slot) in domain.slots().iter().enumerate() {
            assert_eq!(domain.find(slot.key), Some(i));
        }
        assert_eq!(domain.slots()[0].direction, SyncDirection::Output);
        assert_eq!(domain.slots()[1].direction, SyncDirection::Input);
        assert_eq!(domain.find(DomainKey::new(2, 0x7000, 2)), None);
        assert_eq!(domain.find(DomainKey::new(3, 0x7000, 1)), None);

        session.activate().unwrap();
        session.cycle();
        assert_eq!(session.domain_read(2, 0x7000, 2), Err(DomainError::Unmapped(DomainKey::new(2, 0x7000, 2))));
        assert_eq!(session.domain_write(3, 0x7000, 1, 1), Err(DomainError::Unmapped(DomainKey::new(3, 0x7000, 1))));
    }

    #[test]
    fn refused_accesses() {
        init_logs();
        let session = session(bus(), clock()).unwrap();
        assert_eq!(session.domain_write(2, 0x7000, 1, 5), Err(DomainError::NotOperational));
        assert_eq!(session.domain_read(2, 0x6000, 1), Err(DomainError::NotOperational));

        session.activate().unwrap();
        session.cycle();
        assert_eq!(session.domain_write(2, 0x6000, 1, 5), Err(DomainError::NotOutput(DomainKey::new(2, 0x6000, 1))));
    }

    #[test]
    fn padding_and_bits() {
        init_logs();
        let slave = SignalEntry::identity(0, 2, VENDOR, PRODUCT);
        let entries = vec![
            slave.clone().pdo(3, 0x1a00).object(0x6000, 1, 1).in_domain(),
            slave.clone().pdo(3, 0x1a00).object(0x6000, 2, 1).in_domain(),
            slave.clone().pdo(3, 0x1a00).object(0, 0, 6).in_domain(),
            slave.clone().pdo(3, 0x1a00).object(0x6010, 1, 16).in_domain().signed(),
            slave.clone().pdo(2, 0x1600).object(0x7000, 1, 12).in_domain(),
            ];
        let session = Session::new(bus(), clock(), config(), entries, Vec::new()).unwrap();
        let domain = session.domain();
        assert_eq!(domain.len(), 4);
        assert!(domain.slots().iter().all(|slot| slot.key.index != 0));
        assert_eq!(domain.slots()[1].bit_position, 1);

        session.activate().unwrap();
        session.cycle();
        let first = domain.slots()[0].offset;
        session.driver().write_image(first, &[0b10]);
        let word = domain.slot(DomainKey::new(2, 0x6010, 1)).unwrap().offset;
        session.driver().write_image(word, &(-3i16).to_le_bytes());
        session.cycle();

        assert_eq!(session.domain_read(2, 0x6000, 1), Ok(Value::Bit(false)));
        assert_eq!(session.domain_read(2, 0x6000, 2), Ok(Value::Bit(true)));
        assert_eq!(session.domain_read(2, 0x6010, 1), Ok(Value::I16(-3)));
        // 12 bits objects are registered but never exchanged
        assert_eq!(session.domain_read(2, 0x7000, 1), Err(DomainError::Unsupported(DomainKey::new(2, 0x7000, 1))));
        assert_eq!(session.domain_read_as::<u16>(2, 0x7000, 1), Err(DomainError::Unsupported(DomainKey::new(2, 0x7000, 1))));
    }

    #[test]
    fn swapped_sizes() {
        init_logs();
        let slave = SignalEntry::identity(0, 2, VENDOR, PRODUCT);
        let entries = vec![
            slave.clone().pdo(3, 0x1a00).object(0x6000, 1, 8).in_domain().swapped(),
            slave.clone().pdo(3, 0x1a00).object(0x6000, 2, 32).in_domain().swapped(),
            slave.clone().pdo(3, 0x1a00).object(0x6000, 3, 64).in_domain().swapped(),
            slave.clone().pdo(3, 0x1a00).object(0x6000, 4, 32).in_domain(),
            ];
        let session = Session::new(bus(), clock(), config(), entries, Vec::new()).unwrap();
        session.activate().unwrap();
        session.cycle();

        let offset = |subindex| session.domain().slot(DomainKey::new(2, 0x6000, subindex)).unwrap().offset;
        session.driver().write_image(offset(1), &[0x12]);
        session.driver().write_image(offset(2), &[0x12, 0x34, 0x56, 0x78]);
        session.driver().write_image(offset(3), &[1, 2, 3, 4, 5, 6, 7, 8]);
        session.driver().write_image(offset(4), &[0x12, 0x34, 0x56, 0x78]);
        session.cycle();

        // a single byte has no order to swap
        assert_eq!(session.domain_read(2, 0x6000, 1), Ok(Value::U8(0x12)));
        assert_eq!(session.domain_read(2, 0x6000, 2), Ok(Value::U32(0x1234_5678)));
        assert_eq!(session.domain_read_as::<u64>(2, 0x6000, 3), Ok(0x0102_0304_0506_0708));
        assert_eq!(session.domain_read(2, 0x6000, 4), Ok(Value::U32(0x7856_3412)));
    }

    #[test]
    fn duplicate_entry() {
        init_logs();
        let mut entries = entries();
        entries.push(entries[1].clone());
        match Session::new(bus(), clock(), config(), entries, Vec::new()) {
            Err(EthercatError::Slave(ConfigError::DuplicateEntry(key))) => assert_eq!(key, DomainKey::new(2, 0x6000, 1)),
            other => panic!("unexpected {:?}", other.map(|_| ())),
        }
    }

    #[test]
    fn typed_write() {
        init_logs();
        let slave = SignalEntry::identity(0, 2, VENDOR, PRODUCT);
        let entries = vec![
            slave.clone().pdo(2, 0x1600).object(0x7000, 1, 32).in_domain().signed(),
            slave.clone().pdo(2, 0x1600).object(0x7000, 2, 1).in_domain(),
            ];
        let session = Session::new(bus(), clock(), config(), entries, Vec::new()).unwrap();
        session.activate().unwrap();
        session.cycle();
        session.domain_write_as(2, 0x7000, 1, -2i32).unwrap();
        session.domain_write_as(2, 0x7000, 2, true).unwrap();
        session.cycle();

        let domain = session.domain();
        let word = domain.slot(DomainKey::new(2, 0x7000, 1)).unwrap();
        assert_eq!(session.driver().read_image(word.offset, 4), (-2i32).to_le_bytes().to_vec());
        assert_eq!(session.domain_read(2, 0x7000, 1), Ok(Value::I32(-2)));
        assert_eq!(session.domain_read_as::<bool>(2, 0x7000, 2), Ok(true));
    }
}
