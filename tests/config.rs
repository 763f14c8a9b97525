mod common;

#[cfg(test)]
mod tests {
    use super::common::*;
    use ethercycle::{
        EthercatError, ConfigError, SessionConfig, Session, SyncDirection, WatchdogMode, DomainKey,
        config,
        sim::SimCall,
        };

    const SLAVES: &str = r##"[
        {
            "alias": 0, "position": 2, "vendor_id": "0x00000002", "product_code": "0x07d43052",
            "syncs": [
                {
                    "index": 2, "watchdog_enabled": true,
                    "pdos": [{
                        "index": "0x1600",
                        "entries": [{"index": "0x7000", "subindex": 1, "size": 8, "add_to_domain": true}]
                    }]
                },
                {
                    "index": 3,
                    "pdos": [
                        {
                            "index": "0x1a00",
                            "entries": [{"index": "0x6000", "subindex": "0x01", "size": 16, "add_to_domain": true, "swap_endian": true}]
                        },
                        {"index": "0x1a01"}
                    ]
                }
            ],
            "parameters": [{"index": "0x8000", "subindex": 1, "size": 16, "value": 500}]
        },
        {"alias": 0, "position": 1, "vendor_id": 2, "product_code": "#044c2c52"}
    ]"##;

    #[test]
    fn parse_slaves() {
        init_logs();
        let (entries, parameters) = config::parse(SLAVES).unwrap();

        // sorted by position, the coupler without syncs only identifies itself
        assert_eq!(entries.len(), 4);
        assert_eq!(entries[0].position, 1);
        assert_eq!(entries[0].product_code, 0x044c_2c52);
        assert_eq!(entries[0].pdo_index, 0);

        let output = &entries[1];
        assert_eq!(output.key(), DomainKey::new(2, 0x7000, 1));
        assert_eq!((output.sync_index, output.pdo_index, output.bitsize), (2, 0x1600, 8));
        assert_eq!(output.direction, Some(SyncDirection::Output));
        assert_eq!(output.watchdog, Some(true));
        assert!(output.add_to_domain);

        let input = &entries[2];
        assert_eq!(input.key(), DomainKey::new(2, 0x6000, 1));
        assert_eq!(input.direction, Some(SyncDirection::Input));
        assert_eq!(input.watchdog, Some(false));
        assert!(input.swap_endian);
        assert!(! input.signed);

        // a PDO without entries is still assigned
        assert_eq!((entries[3].pdo_index, entries[3].index), (0x1a01, 0));
        assert!(! entries[3].add_to_domain);

        assert_eq!(parameters.len(), 1);
        assert_eq!((parameters[0].position, parameters[0].index, parameters[0].value), (2, 0x8000, 500));
    }

    #[test]
    fn parsed_session() {
        init_logs();
        let (entries, parameters) = config::parse(SLAVES).unwrap();
        let bus = bus().with_slave(1, VENDOR, 0x044c_2c52);
        let session = Session::new(bus, clock(), config(), entries, parameters).unwrap();
        assert_eq!(session.slaves().len(), 2);
        assert_eq!(session.domain().len(), 2);
        assert_eq!(session.driver().object(2, 0x8000, 1), Some(vec![0xf4, 0x01]));
    }

    #[test]
    fn watchdog_without_entries() {
        init_logs();
        let (entries, parameters) = config::parse(r#"[{
            "alias": 0, "position": 2, "vendor_id": 2, "product_code": "0x07d43052",
            "syncs": [{"index": 2, "watchdog_enabled": true, "pdos": [{"index": "0x1600"}]}]
        }]"#).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].watchdog, Some(true));

        let session = Session::new(bus(), clock(), config(), entries, parameters).unwrap();
        assert!(session.driver().calls().contains(&SimCall::SyncManager {
            position: 2,
            sync: 2,
            direction: SyncDirection::Output,
            watchdog: WatchdogMode::Enable,
            }));
    }

    #[test]
    fn invalid_documents() {
        init_logs();
        let invalid = |json: &str| matches!(config::parse(json), Err(EthercatError::Slave(ConfigError::Invalid(_))));

        assert!(invalid("{}"));
        // strict JSON
        assert!(invalid(r#"[{"alias": 0, "position": 1, "vendor_id": 2, "product_code": 3,}]"#));
        assert!(invalid(r#"[{"alias": 0, "position": 70000, "vendor_id": 2, "product_code": 3}]"#));
        assert!(invalid(r#"[{"alias": 0, "position": "zz", "vendor_id": 2, "product_code": 3}]"#));
        assert!(invalid(r#"[{"alias": 0, "position": 1, "vendor_id": 2, "product_code": 3,
            "syncs": [{"index": 4, "pdos": [{"index": "0x1600"}]}]}]"#));
        assert!(! invalid(r#"[{"alias": 0, "position": 1, "vendor_id": 2, "product_code": 3,
            "syncs": [{"index": 4, "direction": "output", "pdos": [{"index": "0x1600"}]}]}]"#));
        assert_eq!(config::parse("[]").map(|(entries, parameters)| (entries.len(), parameters.len())).ok(), Some((0, 0)));
    }

    #[test]
    fn missing_file() {
        match config::load("/nonexistent/slaves.json") {
            Err(EthercatError::Io(_)) => {},
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn timing() {
        let mut config = SessionConfig::default();
        assert_eq!(config.frequency(), 1000);
        assert_eq!(config.period_ns(), 1_000_000);
        config.set_period_us(250);
        assert_eq!(config.frequency(), 4000);
        config.set_frequency(0);
        assert_eq!(config.frequency(), 1);
        assert_eq!(config.period().as_secs(), 1);
        config.set_period_ms(2);
        assert_eq!(config.frequency(), 500);
    }
}
