//! awsiotcore - inspect and exercise an AWS IoT Core device configuration

use awsiotcore::config::DeviceConfig;
use awsiotcore::observability::{init_default_logging, init_logging, LogFormat};
use awsiotcore::transport::mqtt::{
    configure_mqtt_options, RumqttcFactory, DEFAULT_CONNECT_TIMEOUT,
};
use awsiotcore::{device_id_from_cert, DeviceClient, QualityOfService};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process;
use tracing::{error, info, Instrument, Level};

#[derive(Parser)]
#[command(name = "awsiotcore")]
#[command(about = "AWS IoT Core device identity and MQTT connection tool")]
#[command(version)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, value_name = "FILE", default_value = "device.toml")]
    config: PathBuf,

    /// Verbose logging (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the device ID (certificate Common Name)
    DeviceId {
        #[arg(long, value_name = "PATH")]
        cert: PathBuf,
    },
    /// Show device ID, broker and telemetry topic
    Info,
    /// Build connection parameters and MQTT options without connecting
    Check,
    /// Connect, publish one telemetry message and disconnect
    Publish {
        /// JSON payload
        #[arg(long)]
        payload: String,
        /// Topic instead of the device's telemetry topic
        #[arg(long)]
        topic: Option<String>,
        /// QoS 0 or 1; defaults to the configured QoS
        #[arg(long)]
        qos: Option<u8>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    match cli.verbose {
        0 => init_default_logging(),
        1 => init_logging(Level::DEBUG, LogFormat::Compact, false),
        _ => init_logging(Level::TRACE, LogFormat::Compact, true),
    }

    let result = match cli.command {
        Commands::DeviceId { cert } => print_device_id(&cert),
        Commands::Info => show_info(&cli.config),
        Commands::Check => check(&cli.config),
        Commands::Publish {
            payload,
            topic,
            qos,
        } => publish(&cli.config, payload, topic, qos).await,
    };

    if let Err(e) = result {
        error!("Command failed: {}", e);
        process::exit(1);
    }
}

fn load_configuration(path: &Path) -> Result<DeviceConfig, Box<dyn std::error::Error>> {
    info!("Loading configuration from: {}", path.display());
    Ok(DeviceConfig::load_from_file(path)?)
}

fn print_device_id(cert: &Path) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", device_id_from_cert(cert)?);
    Ok(())
}

fn show_info(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_configuration(config_path)?;
    let device = &config.device;

    println!("device_id:       {}", device.id());
    println!("broker:          {}", device.broker().url());
    println!("telemetry_topic: {}", device.telemetry_topic());
    Ok(())
}

fn check(config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_configuration(config_path)?;
    let params = config.device.connection_params(&config.client_options()?)?;
    configure_mqtt_options(&params)?;

    println!("broker_url:   {}", params.broker_url);
    println!("client_id:    {}", params.client_id);
    println!("server_name:  {}", params.tls.server_name);
    println!("min_tls:      {}", params.tls.min_version);
    println!("trust_roots:  {}", params.tls.root_store.len());
    println!("keep_alive:   {}s", params.keep_alive.as_secs());
    println!("clean_start:  {}", params.clean_start);
    Ok(())
}

async fn publish(
    config_path: &Path,
    payload: String,
    topic: Option<String>,
    qos: Option<u8>,
) -> Result<(), Box<dyn std::error::Error>> {
    serde_json::from_str::<serde_json::Value>(&payload)
        .map_err(|e| format!("payload is not valid JSON: {e}"))?;

    let config = load_configuration(config_path)?;
    let mut device = config.device.clone();
    if let Some(topic) = topic {
        device = device.with_telemetry_topic(topic);
    }
    let qos = match qos {
        Some(level) => QualityOfService::try_from(level)?,
        None => config.qos()?,
    };

    let timeout = config.connect_timeout().unwrap_or(DEFAULT_CONNECT_TIMEOUT);
    let factory = RumqttcFactory::with_connect_timeout(timeout);
    let mut client = device.new_client(&factory, &config.client_options()?)?;

    let topic = device.telemetry_topic();
    let span = awsiotcore::mqtt_span!(device_id = %device.id(), topic = %topic);

    async move {
        client.connect().await?;
        let published = match client.publish(&topic, qos, false, payload.into_bytes()).await {
            Ok(()) => client.wait_for_acks(timeout).await,
            Err(e) => Err(e),
        };
        let disconnected = client.disconnect().await;
        published?;
        disconnected?;

        match qos {
            QualityOfService::AtLeastOnce => info!("Telemetry published and acknowledged"),
            QualityOfService::AtMostOnce => info!("Telemetry published"),
        }
        Ok::<(), Box<dyn std::error::Error>>(())
    }
    .instrument(span)
    .await
}
