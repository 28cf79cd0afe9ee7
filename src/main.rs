//! atmod - An AT Command Network Front-End
//!
//! This is the main entry point for the atmod binary.
//! It builds the device from persisted settings, listens for a host and
//! runs one host session at a time against that device.

use atmod::commands::CommandHandler;
use atmod::connection::{handle_connection, ConnectionStats, SessionConfig};
use atmod::device::Device;
use atmod::link::ServerPool;
use atmod::storage::SettingsStore;
use atmod::wifi::{SimNetwork, SimulatedWifi};
use std::net::IpAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Binary configuration
struct Config {
    /// Host to bind the session listener to
    host: String,
    /// Port to listen on for the host
    port: u16,
    /// Address `AT+CIPSERVER` listeners bind to
    listen_ip: IpAddr,
    /// Settings record location
    settings: PathBuf,
    /// Access point the simulated radio can join
    ssid: String,
    password: String,
    /// Join the access point at boot, unless `AT+CWAUTOCONN=0` is stored
    autoconnect: bool,
    /// Log level used when RUST_LOG is not set
    log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: atmod::DEFAULT_HOST.to_string(),
            port: atmod::DEFAULT_PORT,
            listen_ip: IpAddr::from([0, 0, 0, 0]),
            settings: PathBuf::from("atmod-settings.bin"),
            ssid: "atmod".to_string(),
            password: "atmod1234".to_string(),
            autoconnect: false,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Parse configuration from command-line arguments
    fn from_args() -> Self {
        let mut config = Config::default();
        let args: Vec<String> = std::env::args().collect();

        let mut i = 1;
        while i < args.len() {
            match args[i].as_str() {
                "--host" | "-h" => {
                    config.host = value_of(&args, i, "--host").to_string();
                    i += 2;
                }
                "--port" | "-p" => {
                    config.port = value_of(&args, i, "--port").parse().unwrap_or_else(|_| {
                        eprintln!("Error: invalid port number");
                        std::process::exit(1);
                    });
                    i += 2;
                }
                "--listen-ip" => {
                    config.listen_ip =
                        value_of(&args, i, "--listen-ip").parse().unwrap_or_else(|_| {
                            eprintln!("Error: invalid listen address");
                            std::process::exit(1);
                        });
                    i += 2;
                }
                "--settings" | "-s" => {
                    config.settings = PathBuf::from(value_of(&args, i, "--settings"));
                    i += 2;
                }
                "--ssid" => {
                    config.ssid = value_of(&args, i, "--ssid").to_string();
                    i += 2;
                }
                "--password" => {
                    config.password = value_of(&args, i, "--password").to_string();
                    i += 2;
                }
                "--log-level" | "-l" => {
                    config.log_level = value_of(&args, i, "--log-level").to_string();
                    i += 2;
                }
                "--autoconnect" => {
                    config.autoconnect = true;
                    i += 1;
                }
                "--help" => {
                    print_help();
                    std::process::exit(0);
                }
                "--version" | "-v" => {
                    println!("atmod version {}", atmod::VERSION);
                    std::process::exit(0);
                }
                _ => {
                    eprintln!("Unknown argument: {}", args[i]);
                    print_help();
                    std::process::exit(1);
                }
            }
        }

        config
    }

    /// Returns the bind address as a string
    fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

/// Returns the value following flag `i`, exiting when it is missing.
fn value_of<'a>(args: &'a [String], i: usize, flag: &str) -> &'a str {
    match args.get(i + 1) {
        Some(value) => value,
        None => {
            eprintln!("Error: {} requires a value", flag);
            std::process::exit(1);
        }
    }
}

fn print_help() {
    println!(
        r#"
atmod - An AT Command Network Front-End

USAGE:
    atmod [OPTIONS]

OPTIONS:
    -h, --host <HOST>          Host to bind to (default: 127.0.0.1)
    -p, --port <PORT>          Port to listen on for the host (default: 2323)
        --listen-ip <IP>       Address AT+CIPSERVER listeners bind to (default: 0.0.0.0)
    -s, --settings <PATH>      Settings file (default: atmod-settings.bin)
        --ssid <SSID>          Access point the radio can join (default: atmod)
        --password <PASS>      Its password (default: atmod1234)
        --autoconnect          Join the access point at boot (AT+CWAUTOCONN=0 overrides)
    -l, --log-level <LEVEL>    Log level when RUST_LOG is unset (default: info)
    -v, --version              Print version information
        --help                 Print this help message

EXAMPLES:
    atmod                                  # Start on 127.0.0.1:2323
    atmod --port 2424 --autoconnect        # Start joined, on port 2424
    atmod --ssid lab --password hunter22   # Offer a different access point

CONNECTING:
    Any terminal that sends CRLF line endings works:
    $ socat - TCP:127.0.0.1:2323,crlf
    AT

    OK
    AT+CWJAP="atmod","atmod1234"
    WIFI CONNECTED
    WIFI GOT IP

    OK
"#
    );
}

fn print_banner(config: &Config) {
    println!(
        r#"
         █████╗ ████████╗███╗   ███╗ ██████╗ ██████╗
        ██╔══██╗╚══██╔══╝████╗ ████║██╔═══██╗██╔══██╗
        ███████║   ██║   ██╔████╔██║██║   ██║██║  ██║
        ██╔══██║   ██║   ██║╚██╔╝██║██║   ██║██║  ██║
        ██║  ██║   ██║   ██║ ╚═╝ ██║╚██████╔╝██████╔╝
        ╚═╝  ╚═╝   ╚═╝   ╚═╝     ╚═╝ ╚═════╝ ╚═════╝

atmod v{} - AT Command Network Front-End
──────────────────────────────────────────────────────────────
Host port open on {}
Settings file: {}

Use Ctrl+C to shutdown gracefully.
"#,
        atmod::VERSION,
        config.bind_address(),
        config.settings.display()
    );
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Parse command-line arguments
    let config = Config::from_args();

    // Set up logging; RUST_LOG wins over --log-level
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.log_level))?;
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();

    // Print the banner
    print_banner(&config);

    // Build the device (shared by every host session)
    let settings = SettingsStore::open(&config.settings);
    let mut wifi = SimulatedWifi::new(vec![SimNetwork::new(&config.ssid, &config.password)]);
    if config.autoconnect && !settings.get().autoconnect {
        info!("Autoconnect disabled in stored settings");
    } else if config.autoconnect {
        if wifi.associate(&config.ssid) {
            info!(ssid = %config.ssid, "Joined access point at boot");
        } else {
            warn!(ssid = %config.ssid, "Autoconnect skipped, station mode disabled");
        }
    }
    let device = Device::new(settings, Box::new(wifi))
        .with_servers(ServerPool::new(config.listen_ip));
    let device = Arc::new(Mutex::new(CommandHandler::new(device)));
    info!(settings = %config.settings.display(), "Device initialized");

    // Create connection statistics
    let stats = Arc::new(ConnectionStats::new());

    // Bind the TCP listener
    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    // Set up graceful shutdown
    let shutdown = async {
        match signal::ctrl_c().await {
            Ok(()) => info!("Shutdown signal received, stopping..."),
            Err(e) => error!(error = %e, "Failed to listen for Ctrl+C"),
        }
    };

    // Main accept loop
    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&device), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    device.lock().await.device_mut().close_all().await;
    info!("Shutdown complete");
    Ok(())
}

/// Accepts hosts and serves them one after another.
async fn accept_loop(
    listener: TcpListener,
    device: Arc<Mutex<CommandHandler>>,
    stats: Arc<ConnectionStats>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, addr)) => {
                if let Err(e) = stream.set_nodelay(true) {
                    warn!(client = %addr, error = %e, "Failed to set TCP_NODELAY");
                }
                handle_connection(
                    stream,
                    addr,
                    Arc::clone(&device),
                    SessionConfig::default(),
                    Arc::clone(&stats),
                )
                .await;
            }
            Err(e) => {
                error!("Failed to accept connection: {}", e);
            }
        }
    }
}
