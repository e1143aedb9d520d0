use std::env;
use std::net::SocketAddr;

use log::error;
use naming::{NamingConfig, NamingServer};

fn usage() -> String {
    let defaults = NamingConfig::default();
    format!(
        "usage: naming [--service-addr <addr>] [--registration-addr <addr>] [--replication-factor <f>]\n\
         defaults:\n\
         --service-addr {}\n\
         --registration-addr {}\n\
         --replication-factor {}",
        defaults.service_addr, defaults.registration_addr, defaults.replication_factor
    )
}

fn parse_args() -> Result<NamingConfig, String> {
    let args = env::args().skip(1).collect::<Vec<String>>();
    if args.first().map(|a| a == "-h" || a == "--help").unwrap_or(false) {
        return Err(usage());
    }

    let mut config = NamingConfig::default();
    let mut i = 0usize;
    while i < args.len() {
        match args[i].as_str() {
            "--service-addr" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --service-addr".to_string())?;
                config.service_addr = value
                    .parse::<SocketAddr>()
                    .map_err(|e| format!("bad --service-addr: {}", e))?;
            }
            "--registration-addr" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --registration-addr".to_string())?;
                config.registration_addr = value
                    .parse::<SocketAddr>()
                    .map_err(|e| format!("bad --registration-addr: {}", e))?;
            }
            "--replication-factor" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --replication-factor".to_string())?;
                config.replication_factor = value
                    .parse::<f64>()
                    .map_err(|e| format!("bad --replication-factor: {}", e))?;
            }
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }
    Ok(config)
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let config = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    let mut server = match NamingServer::new(config) {
        Ok(v) => v,
        Err(err) => {
            error!("naming: setup failed: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = server.start().await {
        error!("naming: start failed: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("naming: signal wait failed: {}", err);
    }
    server.stop().await;
}
