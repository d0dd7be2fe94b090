use elasticsearch_index_retention::{
    args::{Opt, RetentionConfig},
    es,
    es::indices_clean,
};
use structopt::StructOpt;

fn init_logger(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(level),
    )
    .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::from_args();
    init_logger(opt.verbose);
    log::info!("Elasticsearch index retention started!");

    // everything is validated before the cluster is contacted
    let config = RetentionConfig::from_opt(opt)?;
    log::debug!("config: {:?}", config);

    let client = es::create_client(&config.base_url, config.timeout)?;
    // per-index delete failures are logged and do not change the exit status
    indices_clean(&client, &config).await?;

    Ok(())
}
