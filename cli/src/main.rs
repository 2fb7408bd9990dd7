// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # EFS directory provisioner daemon
//!
//! The `efs-provisioner` binary runs alongside a pre-mounted EFS/NFS share and
//! serves volume lifecycle requests over a small HTTP API.
//!
//! ## Startup
//!
//! 1. Derive the backend DNS name from `FILE_SYSTEM_ID` + `AWS_REGION`, or use
//!    `DNS_NAME` verbatim when provided
//! 2. Locate the share's local mount point in the mount table
//! 3. Probe the backend endpoint (warn-only; a failed probe never aborts)
//! 4. Serve the lifecycle API until the process is stopped

use anyhow::{Context, Result};
use clap::Parser;
use efs_provisioner_core::application::{Provisioner, VolumeLifecycleEngine};
use efs_provisioner_core::domain::ProvisionError;
use efs_provisioner_core::infrastructure::{
    BackendProbe, FsGidReclaimer, FsGroupChanger, MountTable, PathTranslator,
};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod server;

/// EFS directory provisioner - per-tenant directories on a shared filesystem
#[derive(Parser)]
#[command(name = "efs-provisioner")]
#[command(version, about, long_about = None)]
struct Cli {
    /// EFS filesystem id (e.g. fs-0123abcd); combined with --aws-region to
    /// derive the backend DNS name
    #[arg(long, env = "FILE_SYSTEM_ID")]
    file_system_id: Option<String>,

    /// AWS region the filesystem lives in
    #[arg(long, env = "AWS_REGION")]
    aws_region: Option<String>,

    /// Backend DNS name; overrides derivation from filesystem id and region
    #[arg(long, env = "DNS_NAME")]
    dns_name: Option<String>,

    /// Mount table to scan for the share's local mount point
    #[arg(long, default_value = "/proc/mounts", value_name = "FILE")]
    mount_table: PathBuf,

    /// Listen address for the lifecycle API
    #[arg(long, env = "LISTEN_ADDR", default_value = "127.0.0.1:8485")]
    listen: SocketAddr,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,
}

impl Cli {
    /// Backend DNS name, derived unless given explicitly.
    fn server_dns_name(&self) -> Result<String, ProvisionError> {
        if let Some(dns_name) = &self.dns_name {
            return Ok(dns_name.clone());
        }
        let file_system_id = self.file_system_id.as_ref().ok_or_else(|| {
            ProvisionError::ConfigurationMissing("FILE_SYSTEM_ID".to_string())
        })?;
        let aws_region = self
            .aws_region
            .as_ref()
            .ok_or_else(|| ProvisionError::ConfigurationMissing("AWS_REGION".to_string()))?;
        Ok(format!("{file_system_id}.efs.{aws_region}.amazonaws.com"))
    }
}

fn init_logging(log_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.log_level);

    let server = cli
        .server_dns_name()
        .context("backend DNS name is not configured")?;
    info!(server = %server, "starting EFS directory provisioner");

    let mounts = MountTable::load(&cli.mount_table)
        .with_context(|| format!("failed to read mount table {}", cli.mount_table.display()))?;
    let entry = mounts
        .find_source_prefix(&server)
        .context("the share must be mounted before the provisioner starts")?;
    info!(
        source = %entry.source,
        mount_point = %entry.mount_point.display(),
        "located backend mount"
    );

    match BackendProbe::new(&server).resolve() {
        Ok(addr) => info!(%addr, "backend endpoint resolved"),
        Err(err) => warn!(
            "could not confirm that the filesystem at {} exists: {}",
            server, err
        ),
    }

    let translator = PathTranslator::new(&server, &entry.mount_point, &entry.source);
    let reclaimer = Arc::new(FsGidReclaimer::new(&entry.mount_point));
    let engine: Arc<dyn Provisioner> =
        Arc::new(VolumeLifecycleEngine::new(translator, reclaimer, Arc::new(FsGroupChanger)));

    let listener = tokio::net::TcpListener::bind(cli.listen)
        .await
        .with_context(|| format!("failed to bind {}", cli.listen))?;
    info!(listen = %cli.listen, "lifecycle API listening");
    axum::serve(listener, server::router(engine))
        .await
        .context("lifecycle API server failed")?;
    Ok(())
}
