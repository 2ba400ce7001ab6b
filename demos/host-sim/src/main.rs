//! Stands in for "the host application" collaborator the core crate
//! deliberately leaves out of scope: wires an `Engine` to an in-memory
//! loopback transport, backs the file-system hooks with a scratch
//! directory, and logs activity with `tracing` — the one place in this
//! workspace that owns a logging dependency at all.

use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, info};

use tst_engine::callbacks::{FsHandler, UpdateHandler};
use tst_engine::engine::Engine;
use tst_engine::registry::{DeviceConfig, InterfaceConfig, StructConfig};
use tst_engine::timer::TimerService;
use tst_proto::hash::hash_name;
use tst_proto::message::Mode;
use tst_proto::status::StatusCode;

/// Backs the four file-system hooks with a scratch directory that is
/// removed when the demo exits.
struct DirFsHandler {
    root: TempDir,
}

impl DirFsHandler {
    fn resolve(&self, path: &str) -> PathBuf {
        self.root.path().join(path.trim_start_matches('/'))
    }
}

impl FsHandler for DirFsHandler {
    fn list(&mut self, path: &str) -> Result<Vec<u8>, StatusCode> {
        let mut names = Vec::new();
        for entry in fs::read_dir(self.resolve(path)).map_err(|_| StatusCode::NoStructFound)? {
            let entry = entry.map_err(|_| StatusCode::GeneralFail)?;
            names.extend_from_slice(entry.file_name().to_string_lossy().as_bytes());
            names.push(b'\n');
        }
        Ok(names)
    }

    fn upload(&mut self, path: &str, data: &[u8], offset: u32) -> Result<(), StatusCode> {
        let mut file = fs::OpenOptions::new()
            .create(true)
            .write(true)
            .open(self.resolve(path))
            .map_err(|_| StatusCode::GeneralFail)?;
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(|_| StatusCode::GeneralFail)?;
        file.write_all(data).map_err(|_| StatusCode::GeneralFail)
    }

    fn download(&mut self, path: &str, offset: u32, size: u32) -> Result<Vec<u8>, StatusCode> {
        let mut file = fs::File::open(self.resolve(path)).map_err(|_| StatusCode::NoStructFound)?;
        file.seek(SeekFrom::Start(offset as u64))
            .map_err(|_| StatusCode::GeneralFail)?;
        let mut buf = Vec::new();
        if size == 0 {
            file.read_to_end(&mut buf).map_err(|_| StatusCode::GeneralFail)?;
        } else {
            buf.resize(size as usize, 0);
            let read = file.read(&mut buf).map_err(|_| StatusCode::GeneralFail)?;
            buf.truncate(read);
        }
        Ok(buf)
    }

    fn delete(&mut self, path: &str) -> Result<(), StatusCode> {
        fs::remove_file(self.resolve(path)).map_err(|_| StatusCode::NoStructFound)
    }
}

/// Accumulates firmware bytes and just logs progress; there is no real
/// flash to write to in a demo.
#[derive(Default)]
struct LoggingUpdateHandler {
    received: Vec<u8>,
}

impl UpdateHandler for LoggingUpdateHandler {
    fn start(&mut self, total_size: u32) -> StatusCode {
        info!(total_size, "firmware update starting");
        self.received.clear();
        StatusCode::Ok
    }

    fn data(&mut self, seq: u32, data: &[u8]) -> StatusCode {
        debug!(seq, len = data.len(), "firmware chunk accepted");
        self.received.extend_from_slice(data);
        StatusCode::Ok
    }

    fn end(&mut self) -> StatusCode {
        info!(total = self.received.len(), "firmware update complete");
        StatusCode::Ok
    }
}

#[tokio::main]
async fn main() -> Result<(), HostSimError> {
    tracing_subscriber::fmt::init();

    let root = TempDir::new()?;
    let mut engine = Engine::new();
    engine.init(DeviceConfig {
        name: "blink".into(),
        interfaces: vec![InterfaceConfig {
            name: "serial0".into(),
            max_payload: 64,
        }],
        structs: vec![StructConfig {
            name: "counter".into(),
            initial: vec![0; 4],
        }],
    })?;
    engine.set_fs_handler(Box::new(DirFsHandler { root }));
    engine.set_update_handler(Box::new(LoggingUpdateHandler::default()));

    let mut timers = TimerService::new();
    timers.start_periodic("heartbeat", 1000);

    let mut ticker = tokio::time::interval(Duration::from_millis(100));
    for round in 0..10u32 {
        ticker.tick().await;
        drive_round(&mut engine, round)?;
        timers.tick(100, |hash| debug!(hash, "timer fired"));
    }
    Ok(())
}

#[derive(Debug, thiserror::Error)]
enum HostSimError {
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Engine(#[from] tst_engine::error::EngineError),
}

/// One simulated round: on the first round, bring the peer online and
/// push a counter update; every round, drain whatever the engine queued
/// and loop it straight back in, standing in for a transport that
/// echoes frames back immediately.
fn drive_round(engine: &mut Engine, round: u32) -> Result<(), HostSimError> {
    let _span = tracing::info_span!("round", round).entered();

    if round == 0 {
        let mut online = [0u8; 3];
        online[0] = Mode::Online as u8;
        online[1..3].copy_from_slice(&hash_name("blink").to_ne_bytes());
        engine.rx("serial0", &online)?;
        engine.variables_set("serial0", "counter", 0, &round.to_ne_bytes())?;
    }

    while let Some(frame) = engine.tx("serial0")? {
        debug!(len = frame.len(), "draining outbound frame");
        engine.rx("serial0", &frame)?;
    }
    Ok(())
}
