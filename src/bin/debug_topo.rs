use twinpool::config::{Configuration, resolve_thread_count};
use twinpool::{CpuTopology, SystemTopology};

fn main() {
    let topology = SystemTopology::new();
    let cores = topology.logical_cores();
    println!("Detected {} logical cores", cores);
    let pinnable = topology.pinnable_cores();
    println!("Cores in the affinity mask: {}", pinnable);

    let config = Configuration::default();
    match resolve_thread_count("coroutine", config.num_coroutine_threads(), cores) {
        Ok(n) => println!("Default coroutine pool size: {}", n),
        Err(e) => println!("Default coroutine pool size: {}", e),
    }

    for core in 0..pinnable {
        let result = std::thread::spawn(move || SystemTopology::new().pin_current_thread(core))
            .join()
            .unwrap_or_else(|_| {
                Err(twinpool::SchedulerError::PinningFailure {
                    core,
                    reason: "probe thread panicked".to_string(),
                })
            });
        match result {
            Ok(()) => println!("Core {}: pinning ok", core),
            Err(e) => println!("Core {}: {}", core, e),
        }
    }
}
