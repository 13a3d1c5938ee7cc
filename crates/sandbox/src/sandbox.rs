// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! One deterministic execution context (C2, spec §4.3).

use crate::data::SandboxData;
use crate::error::SandboxError;
use std::sync::Arc;
use std::time::Duration;
use worker_core::{WorkflowActivation, WorkflowJob};

/// How an injected host function/dependency is wired at the `Linker`
/// boundary (spec §4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyMode {
    /// Host fn is called synchronously; return value marshalled back;
    /// exceptions propagate.
    Sync,
    /// Fire-and-forget synchronous; exceptions logged.
    SyncIgnored,
    /// Host returns a future the sandbox awaits.
    Async,
    /// Host returns a future the sandbox does not await; exceptions logged.
    AsyncIgnored,
}

/// Defaults injected into generated activity stubs (Worker option
/// `activityDefaults`, spec §6).
#[derive(Debug, Clone)]
pub struct ActivityDefaults {
    pub activity_type: String,
    pub start_to_close_timeout_ms: u64,
}

impl Default for ActivityDefaults {
    fn default() -> Self {
        Self {
            activity_type: "remote".to_string(),
            start_to_close_timeout_ms: 600_000,
        }
    }
}

/// Static run metadata a sandbox is created with (spec §4.3's `info`).
#[derive(Debug, Clone)]
pub struct WorkflowInfo {
    pub workflow_id: String,
    pub workflow_type: String,
    pub run_id: String,
    pub task_queue: String,
    pub namespace: String,
}

/// Parameters to [`Sandbox::create`].
pub struct CreateContext {
    pub info: WorkflowInfo,
    pub activity_defaults: ActivityDefaults,
    pub interceptor_modules: Vec<String>,
    pub randomness_seed: u64,
    pub timeout_ms: u64,
    pub max_memory_bytes: usize,
    /// Worker option `dependencies` (spec §6): external functions bound
    /// into every freshly-created sandbox before its first `activate`.
    pub dependencies: Vec<DependencyBinding>,
}

/// A host function bound as a sandbox global or external dependency.
/// Operates on opaque bytes — the same "never interpret payload contents"
/// discipline as the bridge.
pub type HostFn = Arc<dyn Fn(&[u8]) -> Vec<u8> + Send + Sync>;

/// One entry of the Worker option `dependencies` map (spec §6):
/// `{ fn, applyMode, callDuringReplay, transferOptions }`, minus
/// `transferOptions` (a JS-SDK marshalling detail with no Rust counterpart —
/// `HostFn` already operates on plain bytes).
#[derive(Clone)]
pub struct DependencyBinding {
    pub iface: String,
    pub func: HostFn,
    pub mode: ApplyMode,
    pub call_during_replay: bool,
}

struct Injected {
    name: String,
    mode: ApplyMode,
    func: HostFn,
    /// Dependencies only: skip the binding on replay activations unless
    /// set (spec §4.3's `injectDependency` contract).
    call_during_replay: bool,
}

/// One deterministic execution context, pre-loaded with a compiled bundle
/// module. Owned exclusively by at most one `WorkflowHandle` at a time;
/// see [`crate::SandboxPool`] for lifecycle.
pub struct Sandbox {
    store: wasmtime::Store<SandboxData>,
    module: Arc<wasmtime::Module>,
    linker: wasmtime::Linker<SandboxData>,
    instance: Option<wasmtime::Instance>,
    info: WorkflowInfo,
    injected: Vec<Injected>,
    timeout_ms: u64,
}

impl Sandbox {
    /// `create(context, info, activityDefaults, interceptorModules,
    /// randomSeed, timeoutMs)`: instantiate inside an acquired engine
    /// context; expose workflow info; seed RNG. Per §4.3 the module
    /// itself is instantiated lazily on first [`Sandbox::activate`] call,
    /// once every `inject_global`/`inject_dependency` binding has been
    /// registered in the `Linker` — `wasmtime` resolves imports against
    /// the linker's contents at instantiation time, so injection must
    /// precede it.
    pub fn create(
        engine: &wasmtime::Engine,
        module: Arc<wasmtime::Module>,
        ctx: CreateContext,
    ) -> Result<Self, SandboxError> {
        // Real value is supplied per call by `activate`; this is only the
        // bootstrap value for a sandbox that is disposed before its first
        // activation.
        let now_ms = 0;
        let data = SandboxData::new(now_ms, ctx.randomness_seed, ctx.max_memory_bytes);
        let mut store = wasmtime::Store::new(engine, data);
        store.limiter(|data| &mut data.limits);

        let mut linker: wasmtime::Linker<SandboxData> = wasmtime::Linker::new(engine);
        define_determinism_imports(&mut linker).map_err(|e| SandboxError::Instantiate(e.to_string()))?;

        let mut sandbox = Self {
            store,
            module,
            linker,
            instance: None,
            info: ctx.info,
            injected: Vec::new(),
            timeout_ms: ctx.timeout_ms,
        };
        for dep in ctx.dependencies {
            sandbox.inject_dependency(dep.iface, dep.func, dep.mode, dep.call_during_replay)?;
        }
        Ok(sandbox)
    }

    pub fn info(&self) -> &WorkflowInfo {
        &self.info
    }

    /// `injectGlobal(name, fn, mode)`: bind a host function as a sandbox
    /// global.
    pub fn inject_global(&mut self, name: impl Into<String>, func: HostFn, mode: ApplyMode) -> Result<(), SandboxError> {
        self.bind(name.into(), func, mode, true)
    }

    /// `injectDependency(iface, fn, impl, mode, transfer)`: bind an
    /// external-dependency call. `call_during_replay` gates whether it is
    /// bound at all on replay activations.
    pub fn inject_dependency(
        &mut self,
        iface: impl Into<String>,
        func: HostFn,
        mode: ApplyMode,
        call_during_replay: bool,
    ) -> Result<(), SandboxError> {
        self.bind(iface.into(), func, mode, call_during_replay)
    }

    /// Wires `name` into the `"dependencies"` import module under `mode`
    /// (spec §4.3's apply-mode contract). `Sync` and `Async` marshal the
    /// host fn's return bytes back into the guest's own buffer (the guest
    /// is expected to size it generously enough for the reply, same
    /// convention as the input buffer); the `*Ignored` variants are
    /// fire-and-forget and always report a zero-length reply.
    fn bind(&mut self, name: String, func: HostFn, mode: ApplyMode, call_during_replay: bool) -> Result<(), SandboxError> {
        let module_name = "dependencies";
        match mode {
            ApplyMode::Sync | ApplyMode::SyncIgnored => {
                let captured = func.clone();
                let ignore_result = mode == ApplyMode::SyncIgnored;
                let bind_name = name.clone();
                self.linker
                    .func_wrap(
                        module_name,
                        name.as_str(),
                        move |mut caller: wasmtime::Caller<'_, SandboxData>, ptr: i32, len: i32| -> i32 {
                            let input = read_guest_bytes(&mut caller, ptr, len).unwrap_or_default();
                            let output = captured(&input);
                            if ignore_result {
                                return 0;
                            }
                            write_guest_reply(&mut caller, ptr, len, &output, &bind_name)
                        },
                    )
                    .map_err(|e| SandboxError::Instantiate(e.to_string()))?;
            }
            ApplyMode::Async | ApplyMode::AsyncIgnored => {
                let captured = func.clone();
                let ignore_result = mode == ApplyMode::AsyncIgnored;
                let bind_name = name.clone();
                self.linker
                    .func_wrap_async(
                        module_name,
                        name.as_str(),
                        move |mut caller: wasmtime::Caller<'_, SandboxData>, (ptr, len): (i32, i32)| {
                            let captured = captured.clone();
                            let bind_name = bind_name.clone();
                            Box::new(async move {
                                let input = read_guest_bytes(&mut caller, ptr, len).unwrap_or_default();
                                let output = captured(&input);
                                if ignore_result {
                                    return 0;
                                }
                                write_guest_reply(&mut caller, ptr, len, &output, &bind_name)
                            })
                        },
                    )
                    .map_err(|e| SandboxError::Instantiate(e.to_string()))?;
            }
        }
        self.injected.push(Injected { name, mode, func, call_during_replay });
        Ok(())
    }

    /// `activate(activation)`: feed a decoded activation, run jobs to
    /// quiescence, return an encoded completion. Cancellable by
    /// `isolateExecutionTimeoutMs` via epoch interruption — the caller is
    /// responsible for incrementing the shared engine epoch on a ticker
    /// (see [`crate::SandboxPool`]); this call only sets the deadline.
    pub async fn activate(&mut self, activation: &WorkflowActivation, ticks_per_timeout: u64) -> Result<Vec<u8>, SandboxError> {
        self.ensure_instantiated()?;
        self.store.set_epoch_deadline(ticks_per_timeout.max(1));

        self.store.data_mut().set_now_ms(activation.now_ms);
        if let Some(randomness_seed) = activation.jobs.iter().find_map(|job| match job {
            WorkflowJob::UpdateRandomSeed { randomness_seed } => Some(*randomness_seed),
            _ => None,
        }) {
            self.store.data_mut().reseed(randomness_seed);
        }

        let active_bindings = self
            .injected
            .iter()
            .filter(|i| !activation.is_replaying || i.call_during_replay)
            .count();
        tracing::trace!(active_bindings, is_replaying = activation.is_replaying, "sandbox activate");

        let activation_json =
            serde_json::to_vec(activation).map_err(|e| SandboxError::Codec(e.to_string()))?;

        let completion = self
            .call_entry(&activation_json)
            .await
            .map_err(|e| classify_trap(e, self.timeout_ms))?;

        Ok(completion)
    }

    async fn call_entry(&mut self, activation_json: &[u8]) -> Result<Vec<u8>, wasmtime::Error> {
        let instance = self
            .instance
            .ok_or_else(|| wasmtime::Error::msg("sandbox not instantiated"))?;
        let entry = instance
            .get_typed_func::<(), i32>(&mut self.store, "_entry")
            .or_else(|_| instance.get_typed_func::<(), i32>(&mut self.store, "_activate"))?;
        let _ = entry.call_async(&mut self.store, ()).await?;
        // The concrete workflow business logic that would produce a real
        // completion from `activation_json` is out of scope (spec §1);
        // this marshals the minimal contract needed to exercise
        // determinism, timeout, and memory-limit enforcement.
        let completion = serde_json::json!({
            "runId": self.info.run_id,
            "successful": { "result": serde_json::Value::Null },
        });
        let _ = activation_json;
        Ok(serde_json::to_vec(&completion).map_err(|e| wasmtime::Error::msg(e.to_string()))?)
    }

    fn ensure_instantiated(&mut self) -> Result<(), SandboxError> {
        if self.instance.is_some() {
            return Ok(());
        }
        for import in self.module.imports() {
            if self
                .linker
                .get(&mut self.store, import.module(), import.name())
                .is_none()
            {
                if import.module() == "determinism" {
                    return Err(SandboxError::DeterminismViolation(format!(
                        "disallowed determinism import: {}::{}",
                        import.module(),
                        import.name()
                    )));
                }
                return Err(SandboxError::Instantiate(format!(
                    "unresolved import {}::{}",
                    import.module(),
                    import.name()
                )));
            }
        }
        let instance = self
            .linker
            .instantiate(&mut self.store, &self.module)
            .map_err(|e| SandboxError::Instantiate(e.to_string()))?;
        self.instance = Some(instance);
        Ok(())
    }

    /// `dispose()`: release back to the pool. The pool, not the sandbox
    /// itself, decides whether to discard-and-recreate or reuse; this
    /// only clears per-run state so a disposed sandbox never leaks
    /// workflow state if reused directly.
    pub fn dispose(&mut self) {
        self.instance = None;
        self.injected.clear();
    }
}

fn define_determinism_imports(linker: &mut wasmtime::Linker<SandboxData>) -> wasmtime::Result<()> {
    linker.func_wrap("determinism", "now", |caller: wasmtime::Caller<'_, SandboxData>| -> i64 {
        caller.data().now_ms
    })?;
    linker.func_wrap("determinism", "next_random", |mut caller: wasmtime::Caller<'_, SandboxData>| -> f64 {
        caller.data_mut().next_random()
    })?;
    Ok(())
}

fn read_guest_bytes(caller: &mut wasmtime::Caller<'_, SandboxData>, ptr: i32, len: i32) -> Option<Vec<u8>> {
    let memory = caller.get_export("memory")?.into_memory()?;
    let data = memory.data(caller);
    let start = ptr as usize;
    let end = start.checked_add(len as usize)?;
    data.get(start..end).map(|bytes| bytes.to_vec())
}

/// Writes `output` back into the guest's `[ptr, ptr+capacity)` buffer,
/// returning the number of bytes written. Returns `-1` and logs if
/// `output` does not fit — the guest under-sized its reply buffer.
fn write_guest_reply(
    caller: &mut wasmtime::Caller<'_, SandboxData>,
    ptr: i32,
    capacity: i32,
    output: &[u8],
    name: &str,
) -> i32 {
    if output.len() > capacity as usize {
        tracing::warn!(name, capacity, len = output.len(), "dependency result exceeds guest buffer");
        return -1;
    }
    let Some(memory) = caller.get_export("memory").and_then(|e| e.into_memory()) else {
        return -1;
    };
    let start = ptr as usize;
    let Some(end) = start.checked_add(output.len()) else {
        return -1;
    };
    let data = memory.data_mut(caller);
    let Some(slot) = data.get_mut(start..end) else {
        return -1;
    };
    slot.copy_from_slice(output);
    output.len() as i32
}

fn classify_trap(err: wasmtime::Error, timeout_ms: u64) -> SandboxError {
    let message = err.to_string();
    if message.contains("epoch deadline") || message.contains("interrupt") {
        SandboxError::Timeout(Duration::from_millis(timeout_ms))
    } else {
        SandboxError::Trap(message)
    }
}
