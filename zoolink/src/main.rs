use anyhow::Result;
use clap::{App, Arg};
use std::sync::Arc;
use tokio::signal;
use tracing::Level;
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;
use zoolink_core::config::zookeeper::ZookeeperConfigProperties;
use zoolink_core::config::ConfigSet;
use zoolink_core::zookeeper::{
    ConnectionFactory, ConnectionListener, ListenerResult, ZkTransportBuilder,
};

/// Reports the lifecycle of the supervised connection on the log.
#[derive(Debug)]
struct LoggingListener;

impl ConnectionListener for LoggingListener {
    fn on_connected(&self, id: &str) -> ListenerResult {
        info!("[{}] session established", id);
        Ok(())
    }

    fn on_reconnecting(&self, id: &str) -> ListenerResult {
        warn!("[{}] connection interrupted, reconnecting", id);
        Ok(())
    }

    fn on_close(&self, id: &str) -> ListenerResult {
        info!("[{}] connection closed", id);
        Ok(())
    }
}

#[tokio::main(flavor = "multi_thread", worker_threads = 4)]
async fn main() {
    match main_processor().await {
        Ok(()) => info!("Exiting successfully."),
        Err(err) => {
            error!("Exiting with error: {:?}", err);
            std::process::exit(1);
        },
    }
}

async fn main_processor() -> Result<()> {
    let matches = App::new("Zoolink")
        .version("0.1")
        .author("Seb Ospina <kraige@gmail.com>")
        .about("Establishes and supervises a zookeeper connection")
        .arg(
            Arg::new("INPUT")
                .help("Sets the input config file to use")
                .required_unless_present("list_config")
                .index(1),
        )
        .arg(
            Arg::new("verbosity_level")
                .short('v')
                .takes_value(true)
                .default_value("info")
                .help("Sets the level of verbosity"),
        )
        .arg(
            Arg::new("override")
                .short('o')
                .takes_value(true)
                .multiple_occurrences(true)
                .help("Override properties defined in the config file, as key=value"),
        )
        .arg(
            Arg::new("once")
                .long("once")
                .help("Connect, wait for the session and exit instead of supervising it"),
        )
        .arg(
            Arg::new("list_config")
                .long("list-config")
                .help("Lists the supported properties and exits"),
        )
        .get_matches();
    let verbosity = matches.value_of("verbosity_level").unwrap_or("info");
    let subscriber = FmtSubscriber::builder().with_max_level(verbosity.parse::<Level>()?).finish();
    tracing::subscriber::set_global_default(subscriber)?;

    if matches.is_present("list_config") {
        for property in ZookeeperConfigProperties::default().describe() {
            println!("{}", property);
        }
        return Ok(());
    }

    let config_file = matches.value_of("INPUT").unwrap_or_default();
    info!("Using input file: {}", config_file);
    let mut zk_config = ZookeeperConfigProperties::read_config_file(config_file)?;
    if let Some(property_overrides) = matches.values_of("override") {
        for override_property in property_overrides {
            match override_property.split_once('=') {
                Some((property_name, property_value)) => {
                    zk_config.try_set_property(property_name.trim(), property_value.trim())?
                },
                None => warn!("Ignoring override without '=': {}", override_property),
            }
        }
    }
    let params = zk_config.build()?;
    info!("Connection params: {:?}", params);
    let factory = ConnectionFactory::new(ZkTransportBuilder);

    if matches.is_present("once") {
        let connection = factory.create(&params).await?;
        info!("[{}] connected to {}", connection.id(), params.addresses());
        connection.close();
        return Ok(());
    }

    let listeners: Vec<Arc<dyn ConnectionListener>> = vec![Arc::new(LoggingListener)];
    let connection = factory.create_async(&params, listeners).await?;
    signal::ctrl_c().await?;
    info!("ctrl-c received!");
    connection.close();
    Ok(())
}
