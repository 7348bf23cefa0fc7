use std::io::{self, Read};
use std::path::PathBuf;
use std::thread;
use anyhow::{anyhow, Result};
use env_logger::Builder;
use gumdrop::Options;
use log::{debug, info, LevelFilter};
use tokio::sync::mpsc::{channel, Sender};
use sockwatch::classify::Classifier;
use sockwatch::config::{Config, Overrides};
use sockwatch::probe::{probe, DriverTier};
use sockwatch::scan::Scanner;
use sockwatch::sched::{Input, Monitor};
use sockwatch::sink::{JsonSink, Report, Sink};
use sockwatch::source::Source;
use sockwatch::view::{Sort, View};

#[derive(Options)]
pub struct Args {
    #[options(help = "print help message")]
    help:     bool,
    #[options(help = "output sink: stdout | json[,path=FILE][,pretty=true]")]
    sink:     Option<Sink>,
    #[options(help = "scan once, write a JSON report to FILE and exit")]
    export:   Option<PathBuf>,
    #[options(help = "procfs mount point")]
    root:     Option<PathBuf>,
    #[options(help = "event driver: polling | netlink | ebpf")]
    driver:   Option<DriverTier>,
    #[options(help = "rescan interval in ms")]
    interval: Option<u64>,
    #[options(no_short, help = "forced rescan interval in ms")]
    stale:    Option<u64>,
    #[options(no_short, help = "input debounce window in ms")]
    debounce: Option<u64>,
    #[options(no_short, help = "connection spike threshold")]
    spike:    Option<usize>,
    #[options(no_short, help = "view: overview | all | established | listen | suspicious")]
    view:     Option<View>,
    #[options(no_short, help = "sort: none | pid | process | remote")]
    sort:     Option<Sort>,
    #[options(help = "only show records whose process or remote contains TEXT")]
    filter:   Option<String>,
    #[options(count, help = "increase log verbosity")]
    verbose:  u32,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let args = Args::parse_args_default_or_exit();

    let mut builder = Builder::from_default_env();
    builder.filter(None, match args.verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    });
    builder.init();

    let sink   = args.sink.unwrap_or_default();
    let export = args.export;
    let config = Config::new(Overrides {
        root:     args.root,
        driver:   args.driver,
        interval: args.interval,
        stale:    args.stale,
        debounce: args.debounce,
        spike:    args.spike,
        view:     args.view,
        sort:     args.sort,
        filter:   args.filter,
    });

    debug!("{:?}", config);

    let tier       = config.driver.unwrap_or_else(probe);
    let scanner    = Scanner::new(config.root.clone());
    let classifier = Classifier::new(config.rules.clone());
    let mut monitor = Monitor::new(scanner, classifier, config.cadence);

    if let Some(path) = export {
        let snapshot = monitor.once()?;
        let report   = Report::new(tier, &snapshot, monitor.stats(), monitor.trend(), &config.query);
        JsonSink::to_file(path.clone()).send(&report)?;
        info!("exported {} connections to {}", report.records.len(), path.display());
        return Ok(());
    }

    let mut source = Source::open(tier);
    info!("driver: {}", source.tier());

    let (tx, mut rx) = channel(64);
    let keys = tx.clone();
    thread::spawn(move || match read_keys(keys) {
        Ok(()) => debug!("stdin closed"),
        Err(e) => debug!("stdin reader stopped: {:?}", e),
    });
    spawn(quit(tx));

    monitor.run(&mut source, &mut rx, &sink, &config.query).await
}

/// Every byte on stdin counts as user activity; `q` asks to stop.
fn read_keys(tx: Sender<Input>) -> Result<()> {
    let mut stdin = io::stdin();
    let mut buf = [0u8; 64];

    loop {
        let n = stdin.read(&mut buf)?;
        if n == 0 {
            return Ok(());
        }

        for &key in &buf[..n] {
            let input = match key {
                b'q' | b'Q' => Input::Quit,
                key         => Input::Key(key),
            };
            tx.blocking_send(input).map_err(|_| anyhow!("monitor stopped"))?;
        }
    }
}

async fn quit(tx: Sender<Input>) -> Result<()> {
    tokio::signal::ctrl_c().await?;
    tx.send(Input::Quit).await.map_err(|_| anyhow!("monitor stopped"))?;
    Ok(())
}

fn spawn<F: std::future::Future<Output = Result<()>> + Send + 'static>(task: F) {
    tokio::spawn(async move {
        match task.await {
            Ok(()) => debug!("task finished"),
            Err(e) => debug!("task failed: {:?}", e),
        }
    });
}
