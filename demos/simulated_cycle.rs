use std::{
    sync::Arc,
    error::Error,
    time::Duration,
    };
use futures_concurrency::future::Join;
use ethercycle::{
    Session, SessionConfig, MonotonicClock, AlState,
    config, cyclic,
    sim::SimulatedBus,
    };

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    env_logger::init();
    let path = std::env::args().nth(1).unwrap_or("demos/slaves.json".into());
    let (entries, parameters) = config::load(path)?;

    let bus = SimulatedBus::new()
        .with_slave(0, 0x2, 0x044c2c52)
        .with_slave(2, 0x2, 0x07d43052)
        .with_manual_states();
    let mut settings = SessionConfig::default();
    settings.set_frequency(100);
    settings.realtime = false;

    let session = Arc::new(Session::new(bus.clone(), Arc::new(MonotonicClock), settings, entries, parameters)?);
    let (task, mut data) = cyclic::start(session.clone())?;

    (
        // slaves reach operational state a bit later, as real ones do
        async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            for position in [0, 2]
                {bus.set_slave_state(position, AlState::Operational);}
            for i in 0u8 .. 20 {
                bus.write_image(1, &[0x12, i]);
                session.domain_write_as(2, 0x7000, 1, i).ok();
                tokio::time::sleep(Duration::from_millis(100)).await;
            }
            task.stop();
        },
        async {
            while let Some(cycle) = data.recv().await {
                if cycle.slots.is_empty()
                    {continue}
                let values = cycle.slots.iter()
                    .map(|slot| format!("{}:{:#06x}:{} = {}", slot.position, slot.index, slot.subindex,
                        slot.value.map(|v| v.to_string()).unwrap_or("-".into())))
                    .collect::<Vec<_>>();
                println!("{} {}", cycle.states, values.join("  "));
            }
        },
    ).join().await;

    task.join()?;
    Ok(())
}
