use async_std::task;
use filehearth::config::{ServerConfig, set_config};
use filehearth::net::server::Server;

fn main() -> std::io::Result<()> {
    env_logger::init();

    let cfg = parse_args();
    set_config(cfg);

    let server = Server::new();
    task::block_on(server.run())
}

/// Hand-rolled `--flag value` parsing: `--config <path>` loads a TOML file
/// (falling back to defaults on any error, exactly as
/// [`ServerConfig::from_file`] already does); `--address`, `--port`, and
/// `--root` override individual fields afterwards.
fn parse_args() -> ServerConfig {
    let args: Vec<String> = std::env::args().collect();

    let mut cfg = match find_flag(&args, "--config") {
        Some(path) => ServerConfig::from_file(&path),
        None => ServerConfig::default(),
    };

    if let Some(address) = find_flag(&args, "--address") {
        match address.parse() {
            Ok(addr) => cfg.address = addr,
            Err(e) => log::warn!("ignoring invalid --address {address:?}: {e}"),
        }
    }

    if let Some(port) = find_flag(&args, "--port") {
        match port.parse() {
            Ok(port) => cfg.port = port,
            Err(e) => log::warn!("ignoring invalid --port {port:?}: {e}"),
        }
    }

    if let Some(root) = find_flag(&args, "--root") {
        cfg.document_root = root;
    }

    cfg
}

fn find_flag(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1))
        .cloned()
}
