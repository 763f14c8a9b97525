use std::{
    sync::Arc,
    error::Error,
    time::Duration,
    };
use futures_concurrency::future::Join;
use ethercycle::{
    Session, SessionConfig, MonotonicClock, SignalEntry,
    sim::{SimulatedBus, SdoBehavior},
    };

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();

    let bus = SimulatedBus::new().with_slave(1, 0x2, 0x07d43052);
    bus.set_object(1, 0x1008, 0, b"EL2004");
    bus.set_object(1, 0x1c12, 0, &[1]);
    bus.set_behavior(1, SdoBehavior::BusyFor(50));

    let entries = vec![SignalEntry::identity(0, 1, 0x2, 0x07d43052)];
    let session = Arc::new(Session::new(bus, Arc::new(MonotonicClock), SessionConfig::default(), entries, Vec::new())?);

    println!("device name: {}", session.sdo_read_string(1, 0x1008, 0, 64)?);

    // test read/write
    let received = session.parameter_read_as::<u8>(1, 0x1c12, 0)?;
    session.parameter_write_as(1, 0x1c12, 0, received)?;

    // test concurrent read/write, requests on the same slave are serialized
    let exchange = |name: &'static str| {
        let session = session.clone();
        async move {
            tokio::task::spawn_blocking(move || {
                println!("{} begin", name);
                let received = session.parameter_read(1, 0x1c12, 0, 1, Duration::from_millis(100))?;
                println!("{} between", name);
                session.parameter_write(1, 0x1c12, 0, &received, Duration::from_millis(100))?;
                println!("{} end", name);
                Ok::<_, ethercycle::EthercatError<ethercycle::SdoError>>(())
            }).await
        }
    };
    let (a, b) = (exchange("a"), exchange("b")).join().await;
    a??;
    b??;

    Ok(())
}
