use clap::Parser;
use log::{error, info, warn};
use sniffhawk::configuration::config::Config;
use sniffhawk::controller::controller_handler::Controller;
use sniffhawk::identity::IdentityContext;
use std::path::PathBuf;
use std::time::Duration;

/// How long shutdown waits for in-flight captures before abandoning them.
const BLOCKING_SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

#[derive(Parser, Debug)]
#[command(name = "sniffhawk")]
#[command(version = "0.0.2")]
#[command(about = "Field sensor agent capturing traffic and shipping it to a collection server")]
struct Args {
    /// TOML configuration file
    config_file: PathBuf,

    /// Identity bundle written at sensor registration
    #[arg(long, env = "SNIFFHAWK_IDENTITY", default_value = "/etc/sniffhawk/identity.json")]
    identity: PathBuf,
}

fn main() {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .format_target(false)
        .init();

    println!(
        "
███████╗███╗   ██╗██╗███████╗███████╗██╗  ██╗ █████╗ ██╗    ██╗██╗  ██╗
██╔════╝████╗  ██║██║██╔════╝██╔════╝██║  ██║██╔══██╗██║    ██║██║ ██╔╝
███████╗██╔██╗ ██║██║█████╗  █████╗  ███████║███████║██║ █╗ ██║█████╔╝ 
╚════██║██║╚██╗██║██║██╔══╝  ██╔══╝  ██╔══██║██╔══██║██║███╗██║██╔═██╗ 
███████║██║ ╚████║██║██║     ██║     ██║  ██║██║  ██║╚███╔███╔╝██║  ██╗
╚══════╝╚═╝  ╚═══╝╚═╝╚═╝     ╚═╝     ╚═╝  ╚═╝╚═╝  ╚═╝ ╚══╝╚══╝ ╚═╝  ╚═╝
======================================================================
              Field sensor capture agent v0.0.2
======================================================================
"
    );

    let args = Args::parse();

    info!("Importing configuration");
    let config = Config::from_file(&args.config_file).unwrap_or_else(|e| {
        error!(
            "Unable to import configuration from {}: {}",
            args.config_file.display(),
            e
        );
        std::process::exit(1);
    });
    info!("Configuration imported successfully");

    let identity = IdentityContext::from_file(&args.identity).unwrap_or_else(|e| {
        error!(
            "Unable to load sensor identity from {}: {}",
            args.identity.display(),
            e
        );
        std::process::exit(1);
    });
    info!(
        "Sensor {} reporting to {}:{}",
        identity.sensor_id, identity.server_host, identity.server_port
    );

    let blocking_threads = blocking_pool_size(&config);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .max_blocking_threads(blocking_threads)
        .build()
        .unwrap_or_else(|e| {
            error!("Unable to start the async runtime: {}", e);
            std::process::exit(1);
        });

    let controller = Controller::new(config, identity).unwrap_or_else(|e| {
        error!("Unable to create a controller instance: {}, exiting...", e);
        std::process::exit(1);
    });

    let result = runtime.block_on(async move {
        info!("Spawning the controller");
        controller.run().await
    });
    // Captures still blocked on a quiet interface are abandoned.
    runtime.shutdown_timeout(BLOCKING_SHUTDOWN_GRACE);

    match result {
        Ok(stats) => {
            if stats.dropped > 0 {
                warn!("{} artifact(s) were dropped after exhausting retries", stats.dropped);
            }
            info!("Stopped, {} artifact(s) delivered", stats.delivered);
        }
        Err(e) => {
            error!("Error occured in the controller process: {}, exiting...", e);
            std::process::exit(1);
        }
    }
}

/// Captures can hold a blocking thread indefinitely on a quiet interface, so
/// the pool keeps at least one thread beyond the interface count for file I/O.
fn blocking_pool_size(config: &Config) -> usize {
    let minimum = config.interfaces.len() + 1;
    if config.capture.blocking_threads < minimum {
        warn!(
            "capture.blocking_threads = {} is too small for {} interface(s), using {}",
            config.capture.blocking_threads,
            config.interfaces.len(),
            minimum
        );
        return minimum;
    }
    config.capture.blocking_threads
}
