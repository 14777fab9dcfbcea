use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use std::collections::HashMap;
use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc as std_mpsc;
use std::sync::Arc;
use thiserror::Error;

const READ_CHUNK_SIZE: usize = 8 * 1024;

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("Process handle not found: {0}")]
    HandleNotFound(String),

    #[error("Failed to spawn {program}: {message}")]
    Spawn { program: String, message: String },

    #[error("PTY error: {0}")]
    Pty(String),

    #[error("PTY I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone)]
pub struct SpawnOptions {
    pub cwd: PathBuf,
    pub env: HashMap<String, String>,
    pub cols: u16,
    pub rows: u16,
}

impl SpawnOptions {
    pub fn new(cwd: PathBuf) -> Self {
        Self {
            cwd,
            env: HashMap::new(),
            cols: 120,
            rows: 40,
        }
    }

    pub fn with_env(mut self, env: HashMap<String, String>) -> Self {
        self.env = env;
        self
    }

    pub fn with_size(mut self, cols: u16, rows: u16) -> Self {
        self.cols = cols;
        self.rows = rows;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: String,
    pub pid: Option<u32>,
}

pub type DataListener = Box<dyn FnMut(&str) + Send>;
pub type ExitListener = Box<dyn FnMut(Option<i32>) + Send>;

/// Owns every child process. Handles start paused: listeners registered
/// before `resume` see the first byte of output.
pub trait ProcessHost: Send + Sync {
    fn spawn(
        &self,
        program: &str,
        args: &[String],
        options: SpawnOptions,
    ) -> Result<ProcessInfo, PoolError>;
    fn write(&self, id: &str, data: &str) -> Result<(), PoolError>;
    fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), PoolError>;
    fn kill(&self, id: &str) -> Result<(), PoolError>;
    fn on_data(&self, id: &str, listener: DataListener) -> Result<(), PoolError>;
    fn on_exit(&self, id: &str, listener: ExitListener) -> Result<(), PoolError>;
    fn resume(&self, id: &str) -> Result<(), PoolError>;
    fn kill_all(&self);
}

#[derive(Default)]
struct Listeners {
    data: Vec<DataListener>,
    exit: Vec<ExitListener>,
}

struct PtyHandle {
    master: Mutex<Box<dyn MasterPty + Send>>,
    writer: Mutex<Box<dyn Write + Send>>,
    killer: Mutex<Box<dyn ChildKiller + Send + Sync>>,
    listeners: Arc<Mutex<Listeners>>,
    gate: Mutex<Option<std_mpsc::Sender<()>>>,
}

type HandleMap = Arc<Mutex<HashMap<String, Arc<PtyHandle>>>>;

#[derive(Clone, Default)]
pub struct PtyPool {
    handles: HandleMap,
}

impl PtyPool {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, id: &str) -> bool {
        self.handles.lock().contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.handles.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn handle(&self, id: &str) -> Result<Arc<PtyHandle>, PoolError> {
        self.handles
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| PoolError::HandleNotFound(id.to_string()))
    }
}

fn pty_error(error: impl std::fmt::Display) -> PoolError {
    PoolError::Pty(error.to_string())
}

/// Appends `bytes` to `carry` and returns the decodable prefix. An
/// incomplete trailing sequence stays in `carry`; invalid bytes become
/// U+FFFD.
pub fn decode_utf8_chunk(carry: &mut Vec<u8>, bytes: &[u8]) -> String {
    carry.extend_from_slice(bytes);
    let mut out = String::new();

    loop {
        match std::str::from_utf8(carry.as_slice()) {
            Ok(text) => {
                out.push_str(text);
                carry.clear();
                break;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&carry[..valid]));
                match e.error_len() {
                    None => {
                        carry.drain(..valid);
                        break;
                    }
                    Some(len) => {
                        out.push('\u{FFFD}');
                        carry.drain(..valid + len);
                    }
                }
            }
        }
    }

    out
}

fn run_reader(
    id: String,
    mut reader: Box<dyn Read + Send>,
    mut child: Box<dyn Child + Send + Sync>,
    listeners: Arc<Mutex<Listeners>>,
    gate: std_mpsc::Receiver<()>,
    handles: HandleMap,
) {
    // A dropped sender releases the gate as well.
    let _ = gate.recv();

    let mut buffer = [0_u8; READ_CHUNK_SIZE];
    let mut carry = Vec::new();
    loop {
        match reader.read(&mut buffer) {
            Ok(0) => break,
            Ok(read) => {
                let text = decode_utf8_chunk(&mut carry, &buffer[..read]);
                if text.is_empty() {
                    continue;
                }
                let mut guard = listeners.lock();
                for listener in guard.data.iter_mut() {
                    listener(&text);
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => {
                tracing::debug!("PTY {} read ended: {}", id, e);
                break;
            }
        }
    }

    let code = match child.wait() {
        Ok(status) => Some(status.exit_code() as i32),
        Err(e) => {
            tracing::warn!("PTY {} wait failed: {}", id, e);
            None
        }
    };
    tracing::debug!("PTY {} exited with {:?}", id, code);

    {
        let mut guard = listeners.lock();
        for listener in guard.exit.iter_mut() {
            listener(code);
        }
    }
    handles.lock().remove(&id);
}

impl ProcessHost for PtyPool {
    fn spawn(
        &self,
        program: &str,
        args: &[String],
        options: SpawnOptions,
    ) -> Result<ProcessInfo, PoolError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                cols: options.cols.max(1),
                rows: options.rows.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)?;

        let mut command = CommandBuilder::new(program);
        command.args(args);
        command.cwd(&options.cwd);
        command.env("TERM", "xterm-256color");
        for (key, value) in &options.env {
            command.env(key, value);
        }

        let child = pair
            .slave
            .spawn_command(command)
            .map_err(|e| PoolError::Spawn {
                program: program.to_string(),
                message: e.to_string(),
            })?;
        drop(pair.slave);

        let pid = child.process_id();
        let killer = child.clone_killer();
        let reader = pair.master.try_clone_reader().map_err(pty_error)?;
        let writer = pair.master.take_writer().map_err(pty_error)?;

        let id = uuid::Uuid::new_v4().to_string();
        let listeners = Arc::new(Mutex::new(Listeners::default()));
        let (gate_tx, gate_rx) = std_mpsc::channel();

        let handle = Arc::new(PtyHandle {
            master: Mutex::new(pair.master),
            writer: Mutex::new(writer),
            killer: Mutex::new(killer),
            listeners: Arc::clone(&listeners),
            gate: Mutex::new(Some(gate_tx)),
        });
        self.handles.lock().insert(id.clone(), handle);

        let thread_id = id.clone();
        let handles = Arc::clone(&self.handles);
        std::thread::Builder::new()
            .name(format!("pty-{}", &id[..8]))
            .spawn(move || run_reader(thread_id, reader, child, listeners, gate_rx, handles))?;

        tracing::info!("Spawned {} (pid {:?}) as {}", program, pid, id);
        Ok(ProcessInfo { id, pid })
    }

    fn write(&self, id: &str, data: &str) -> Result<(), PoolError> {
        let handle = self.handle(id)?;
        let mut writer = handle.writer.lock();
        writer.write_all(data.as_bytes())?;
        writer.flush()?;
        Ok(())
    }

    fn resize(&self, id: &str, cols: u16, rows: u16) -> Result<(), PoolError> {
        let handle = self.handle(id)?;
        let master = handle.master.lock();
        master
            .resize(PtySize {
                cols: cols.max(1),
                rows: rows.max(1),
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(pty_error)
    }

    fn kill(&self, id: &str) -> Result<(), PoolError> {
        let handle = self
            .handles
            .lock()
            .remove(id)
            .ok_or_else(|| PoolError::HandleNotFound(id.to_string()))?;
        // Release a still-paused reader so it can observe EOF and reap.
        handle.gate.lock().take();
        if let Err(e) = handle.killer.lock().kill() {
            tracing::debug!("Kill of {} failed (already exited?): {}", id, e);
        }
        Ok(())
    }

    fn on_data(&self, id: &str, listener: DataListener) -> Result<(), PoolError> {
        self.handle(id)?.listeners.lock().data.push(listener);
        Ok(())
    }

    fn on_exit(&self, id: &str, listener: ExitListener) -> Result<(), PoolError> {
        self.handle(id)?.listeners.lock().exit.push(listener);
        Ok(())
    }

    fn resume(&self, id: &str) -> Result<(), PoolError> {
        let handle = self.handle(id)?;
        if let Some(gate) = handle.gate.lock().take() {
            let _ = gate.send(());
        }
        Ok(())
    }

    fn kill_all(&self) {
        let ids: Vec<String> = self.handles.lock().keys().cloned().collect();
        for id in ids {
            let _ = self.kill(&id);
        }
    }
}
