pub mod pool;

pub use pool::{
    DataListener, ExitListener, PoolError, ProcessHost, ProcessInfo, PtyPool, SpawnOptions,
};

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::collections::HashMap;
    use std::path::PathBuf;
    use std::sync::Mutex;

    #[derive(Debug, Clone)]
    pub struct SpawnRecord {
        pub id: String,
        pub program: String,
        pub args: Vec<String>,
        pub cwd: PathBuf,
    }

    #[derive(Default)]
    struct FakeHandle {
        data: Vec<DataListener>,
        exit: Vec<ExitListener>,
    }

    #[derive(Default)]
    struct FakeState {
        next_id: u32,
        handles: HashMap<String, FakeHandle>,
        spawns: Vec<SpawnRecord>,
        writes: Vec<(String, String)>,
        kills: Vec<String>,
        fail_next_spawn: bool,
    }

    /// In-memory process host driven by the test through `emit_data` and
    /// `emit_exit`.
    #[derive(Default)]
    pub struct FakeHost {
        state: Mutex<FakeState>,
    }

    impl FakeHost {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn fail_next_spawn(&self) {
            self.state.lock().unwrap().fail_next_spawn = true;
        }

        pub fn emit_data(&self, id: &str, text: &str) {
            let mut state = self.state.lock().unwrap();
            if let Some(handle) = state.handles.get_mut(id) {
                for listener in handle.data.iter_mut() {
                    listener(text);
                }
            }
        }

        pub fn emit_exit(&self, id: &str, code: Option<i32>) {
            let handle = self.state.lock().unwrap().handles.remove(id);
            if let Some(mut handle) = handle {
                for listener in handle.exit.iter_mut() {
                    listener(code);
                }
            }
        }

        pub fn spawns(&self) -> Vec<SpawnRecord> {
            self.state.lock().unwrap().spawns.clone()
        }

        pub fn last_spawn(&self) -> SpawnRecord {
            self.spawns().pop().expect("no process was spawned")
        }

        pub fn writes(&self) -> Vec<(String, String)> {
            self.state.lock().unwrap().writes.clone()
        }

        pub fn kills(&self) -> Vec<String> {
            self.state.lock().unwrap().kills.clone()
        }

        pub fn is_live(&self, id: &str) -> bool {
            self.state.lock().unwrap().handles.contains_key(id)
        }
    }

    impl ProcessHost for FakeHost {
        fn spawn(
            &self,
            program: &str,
            args: &[String],
            options: SpawnOptions,
        ) -> Result<ProcessInfo, PoolError> {
            let mut state = self.state.lock().unwrap();
            if std::mem::take(&mut state.fail_next_spawn) {
                return Err(PoolError::Spawn {
                    program: program.to_string(),
                    message: "scripted failure".to_string(),
                });
            }
            state.next_id += 1;
            let id = format!("pty-{}", state.next_id);
            state.handles.insert(id.clone(), FakeHandle::default());
            state.spawns.push(SpawnRecord {
                id: id.clone(),
                program: program.to_string(),
                args: args.to_vec(),
                cwd: options.cwd,
            });
            Ok(ProcessInfo {
                id,
                pid: Some(4000 + state.next_id),
            })
        }

        fn write(&self, id: &str, data: &str) -> Result<(), PoolError> {
            let mut state = self.state.lock().unwrap();
            if !state.handles.contains_key(id) {
                return Err(PoolError::HandleNotFound(id.to_string()));
            }
            state.writes.push((id.to_string(), data.to_string()));
            Ok(())
        }

        fn resize(&self, id: &str, _cols: u16, _rows: u16) -> Result<(), PoolError> {
            if self.is_live(id) {
                Ok(())
            } else {
                Err(PoolError::HandleNotFound(id.to_string()))
            }
        }

        fn kill(&self, id: &str) -> Result<(), PoolError> {
            let mut state = self.state.lock().unwrap();
            state.kills.push(id.to_string());
            state
                .handles
                .remove(id)
                .map(|_| ())
                .ok_or_else(|| PoolError::HandleNotFound(id.to_string()))
        }

        fn on_data(&self, id: &str, listener: DataListener) -> Result<(), PoolError> {
            let mut state = self.state.lock().unwrap();
            let handle = state
                .handles
                .get_mut(id)
                .ok_or_else(|| PoolError::HandleNotFound(id.to_string()))?;
            handle.data.push(listener);
            Ok(())
        }

        fn on_exit(&self, id: &str, listener: ExitListener) -> Result<(), PoolError> {
            let mut state = self.state.lock().unwrap();
            let handle = state
                .handles
                .get_mut(id)
                .ok_or_else(|| PoolError::HandleNotFound(id.to_string()))?;
            handle.exit.push(listener);
            Ok(())
        }

        fn resume(&self, _id: &str) -> Result<(), PoolError> {
            Ok(())
        }

        fn kill_all(&self) {
            let mut state = self.state.lock().unwrap();
            let ids: Vec<String> = state.handles.keys().cloned().collect();
            state.kills.extend(ids);
            state.handles.clear();
        }
    }
}
