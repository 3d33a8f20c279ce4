use std::{
    net::SocketAddr,
    path::PathBuf,
    sync::{Arc, Mutex, PoisonError},
};

use anyhow::Context;
use blackhole::{
    api,
    ebpf::{AyaDatapath, XdpMode},
    shutdown::Shutdown,
    Session,
};
use clap::Parser;
use log::{info, warn};
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
struct Opt {
    /// Interface to guard
    iface: String,
    /// Addresses allowed in before any traffic is sent to them
    whitelist: Vec<String>,
    /// Object file holding the egress learner
    #[clap(long, default_value = "tc-egress")]
    egress_image: PathBuf,
    /// Object file holding the ingress classifier
    #[clap(long, default_value = "xdp-ingress")]
    ingress_image: PathBuf,
    /// bpffs directory the whitelist map is pinned under
    #[clap(long, default_value = "/sys/fs/bpf/blackhole")]
    pin_path: PathBuf,
    #[clap(long, value_enum, default_value_t)]
    xdp_mode: XdpMode,
    /// Serve the admin API on this address
    #[clap(long)]
    listen: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let opt = Opt::parse();

    env_logger::init();

    // Before anything is attached, so an early signal still leads to cleanup
    let mut shutdown = Shutdown::install().context("signal handlers")?;

    let mut session = Session::new(AyaDatapath::new(&opt.pin_path, opt.xdp_mode.into()));
    session
        .init(&opt.iface, &opt.egress_image, &opt.ingress_image)
        .with_context(|| format!("attach to {}", opt.iface))?;
    let failed = session.seed(opt.whitelist.as_slice());
    if !failed.is_empty() {
        warn!("{} of {} seed addresses rejected", failed.len(), opt.whitelist.len());
    }

    let session = Arc::new(Mutex::new(session));
    let listener = match opt.listen {
        Some(addr) => Some(TcpListener::bind(addr).await.context("admin listener")?),
        None => None,
    };
    let admin = {
        let session = session.clone();
        async move {
            match listener {
                Some(listener) => api::serve(listener, session).await,
                None => std::future::pending().await,
            }
        }
    };

    info!("Waiting for Ctrl-C...");
    let res = tokio::select! {
        kind = shutdown.recv() => {
            info!("Received {kind:?}");
            Ok(())
        }
        res = admin => res,
    };
    info!("Exiting...");

    session
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .cleanup();
    res
}
