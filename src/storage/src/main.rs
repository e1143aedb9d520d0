use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;

use dfs_lib::REGISTRATION_PORT;
use dfs_proto::RegistrationStub;
use log::error;
use storage::{StorageConfig, StorageServer};

struct RunOptions {
    config: StorageConfig,
    hostname: String,
    naming_addr: SocketAddr,
}

fn usage() -> String {
    format!(
        "usage: storage <root> [--hostname <name>] [--naming-addr <addr>] [--storage-addr <addr>] [--command-addr <addr>]\n\
         defaults:\n\
         --hostname localhost\n\
         --naming-addr 127.0.0.1:{}\n\
         storage and command ports are system-assigned",
        REGISTRATION_PORT
    )
}

fn parse_args() -> Result<RunOptions, String> {
    let args = env::args().skip(1).collect::<Vec<String>>();
    if args.is_empty() || args[0] == "-h" || args[0] == "--help" {
        return Err(usage());
    }

    let mut options = RunOptions {
        config: StorageConfig {
            root: PathBuf::from(args[0].clone()),
            storage_addr: None,
            command_addr: None,
        },
        hostname: "localhost".to_string(),
        naming_addr: SocketAddr::from(([127, 0, 0, 1], REGISTRATION_PORT)),
    };

    let mut i = 1usize;
    while i < args.len() {
        match args[i].as_str() {
            "--hostname" => {
                i += 1;
                options.hostname = args
                    .get(i)
                    .ok_or_else(|| "missing value for --hostname".to_string())?
                    .clone();
            }
            "--naming-addr" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --naming-addr".to_string())?;
                options.naming_addr = value
                    .parse::<SocketAddr>()
                    .map_err(|e| format!("bad --naming-addr: {}", e))?;
            }
            "--storage-addr" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --storage-addr".to_string())?;
                options.config.storage_addr = Some(
                    value
                        .parse::<SocketAddr>()
                        .map_err(|e| format!("bad --storage-addr: {}", e))?,
                );
            }
            "--command-addr" => {
                i += 1;
                let value = args
                    .get(i)
                    .ok_or_else(|| "missing value for --command-addr".to_string())?;
                options.config.command_addr = Some(
                    value
                        .parse::<SocketAddr>()
                        .map_err(|e| format!("bad --command-addr: {}", e))?,
                );
            }
            other => {
                return Err(format!("unknown argument: {}\n{}", other, usage()));
            }
        }
        i += 1;
    }
    Ok(options)
}

#[tokio::main]
async fn main() {
    env_logger::init();
    let options = match parse_args() {
        Ok(v) => v,
        Err(msg) => {
            eprintln!("{}", msg);
            std::process::exit(1);
        }
    };

    let naming = match RegistrationStub::connect(options.naming_addr) {
        Ok(v) => v,
        Err(err) => {
            error!("storage: bad naming address: {}", err);
            std::process::exit(1);
        }
    };
    let mut server = match StorageServer::new(options.config) {
        Ok(v) => v,
        Err(err) => {
            error!("storage: setup failed: {}", err);
            std::process::exit(1);
        }
    };
    if let Err(err) = server.start(&options.hostname, &naming).await {
        error!("storage: start failed: {}", err);
        std::process::exit(1);
    }

    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("storage: signal wait failed: {}", err);
    }
    server.stop().await;
}
