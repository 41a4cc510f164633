//! Keystone demo: streams a few synthetic chunks through the support worker,
//! knocks out the pillars of a bridge and reports what falls.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use keystone::core::{logging, IVec3, Result, SupportConfig};
use keystone::debug::SupportDebugHandler;
use keystone::octree::SolidityGrid;
use keystone::support::{assess_group, BlockProperties, SupportEvent, SupportHandle};

/// Stone everywhere, with a little levitation in the deck's centre block
struct DemoBlocks {
    anchor: IVec3,
}

impl BlockProperties for DemoBlocks {
    fn mass(&self, _pos: IVec3) -> f32 {
        1.0
    }

    fn levitation(&self, pos: IVec3) -> Option<f32> {
        (pos == self.anchor).then_some(5.0)
    }
}

fn main() {
    logging::init();
    log::info!("Keystone starting...");

    let args: Vec<String> = std::env::args().collect();
    if let Err(e) = run(&args) {
        log::error!("{}", e);
        std::process::exit(1);
    }
}

fn run(args: &[String]) -> Result<()> {
    let config = match parse_config_arg(args) {
        Some(path) => {
            log::info!("Loading config from: {}", path.display());
            SupportConfig::load_sync(&path)?
        }
        None => SupportConfig::default(),
    };
    let size = config.chunk_size;
    let mut handle = SupportHandle::spawn(config)?;

    if has_flag(args, "--serve") {
        start_debug_server(handle.client().clone());
    }

    let height = size.min(16);
    let pillars = [IVec3::new(4, 0, 4), IVec3::new(size + 4, 0, 4)];
    let solid = |pos: IVec3| {
        pos.y < 2
            || (pillars.iter().any(|p| p.x == pos.x && p.z == pos.z) && pos.y < height - 2)
            || (pos.y == height - 3 && pos.z == 4 && (4..=size + 4).contains(&pos.x))
    };
    for cx in 0..2 {
        for cz in 0..2 {
            let corner = IVec3::new(cx * size, 0, cz * size);
            handle.load_chunk(SolidityGrid::from_fn(size, |p| solid(corner + p)), corner)?;
        }
    }
    handle.sync_blocking()?;
    log::info!("Loaded world: {:?}", handle.stats_blocking()?);

    for pillar in pillars {
        handle.remove_block(pillar + IVec3::new(0, 2, 0))?;
    }
    handle.sync_blocking()?;

    let blocks = DemoBlocks {
        anchor: IVec3::new(size / 2 + 4, height - 3, 4),
    };
    for event in handle.poll_events() {
        match event {
            SupportEvent::Detached(group) => {
                let assessment = assess_group(&group, &blocks);
                log::info!(
                    "Detached {} blocks spanning {:?}: mass {}, levitation {}, {}",
                    group.len(),
                    group.bounds(),
                    assessment.mass,
                    assessment.levitation,
                    if assessment.falls() { "falls" } else { "hovers" }
                );
            }
            SupportEvent::Failed(message) => log::error!("Worker failed: {}", message),
        }
    }
    handle.validate_blocking()?;

    if has_flag(args, "--serve") {
        log::info!("Serving debug protocol; press Ctrl-C to exit");
        loop {
            std::thread::sleep(Duration::from_secs(3600));
        }
    }
    handle.shutdown();
    Ok(())
}

/// Start the debug server in a background thread with its own tokio runtime
fn start_debug_server(client: keystone::support::SupportClient) {
    std::thread::spawn(move || {
        let rt = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
            Ok(rt) => rt,
            Err(e) => {
                log::error!("Failed to create debug runtime: {}", e);
                return;
            }
        };
        rt.block_on(async {
            let handler = Arc::new(tokio::sync::Mutex::new(SupportDebugHandler::new(client)));
            let _server = keystone_debug::DebugServer::start(handler, keystone_debug::DEFAULT_PORT);
            log::info!("Debug server started on port {}", keystone_debug::DEFAULT_PORT);
            // Keep runtime alive forever
            loop {
                tokio::time::sleep(Duration::from_secs(3600)).await;
            }
        });
    });
}

/// Parse --config argument from command line
fn parse_config_arg(args: &[String]) -> Option<PathBuf> {
    args.iter()
        .position(|arg| arg == "--config" || arg == "-c")
        .and_then(|i| args.get(i + 1))
        .map(PathBuf::from)
}

fn has_flag(args: &[String], flag: &str) -> bool {
    args.iter().any(|arg| arg == flag)
}
