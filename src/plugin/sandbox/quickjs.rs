//! QuickJS 沙箱实现
//!
//! 脚本运行时只存在于专用的工作线程中，宿主通过命令通道与之交互。
//! 每个插件包拥有独立的脚本上下文，插件包之间互不可见

use parking_lot::Mutex;
use rquickjs::{Array, CatchResultExt, Context, Function, Object, Persistent, Runtime};
use std::collections::HashMap;
use std::fmt::Display;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender, SyncSender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::{ExecutedBundle, ModuleId, ModuleLease, SandboxOptions, ScriptSandbox};
use crate::plugin::error::SandboxError;

const BOOTSTRAP_SOURCE: &str = include_str!("bootstrap.js");
const INVOKE_SOURCE: &str = include_str!("invoke.js");
const WORKER_STACK_SIZE: usize = 8 * 1024 * 1024;

type Reply<T> = SyncSender<Result<T, SandboxError>>;

enum Command {
    Validate {
        source: String,
        reply: Reply<()>,
    },
    Execute {
        module: ModuleId,
        bundle_url: String,
        source: String,
        reply: Reply<serde_json::Value>,
    },
    Invoke {
        module: ModuleId,
        function: u32,
        props: String,
        capabilities: String,
        reply: Reply<String>,
    },
    Release {
        module: ModuleId,
    },
    Shutdown,
}

/// QuickJS 沙箱
pub struct QuickJsSandbox {
    commands: Mutex<Option<Sender<Command>>>,
    worker: Mutex<Option<JoinHandle<()>>>,
    available: Arc<AtomicBool>,
    next_module: AtomicU64,
}

impl QuickJsSandbox {
    /// 启动沙箱工作线程
    ///
    /// 启动失败时返回不可用的沙箱，后续加载会以 `UnsupportedEnvironment` 失败
    pub fn start(options: SandboxOptions) -> Arc<Self> {
        let (tx, rx) = mpsc::channel();
        let (ready_tx, ready_rx) = mpsc::sync_channel(1);
        let available = Arc::new(AtomicBool::new(false));
        let flag = available.clone();

        let spawned = thread::Builder::new()
            .name("plugin-sandbox".to_string())
            .stack_size(WORKER_STACK_SIZE)
            .spawn(move || {
                let worker = match Worker::new(options) {
                    Ok(worker) => worker,
                    Err(e) => {
                        let _ = ready_tx.send(Err(e));
                        return;
                    }
                };
                flag.store(true, Ordering::SeqCst);
                let _ = ready_tx.send(Ok(()));
                worker.run(rx);
                flag.store(false, Ordering::SeqCst);
            });

        let (commands, worker) = match spawned {
            Ok(handle) => match ready_rx.recv() {
                Ok(Ok(())) => {
                    info!("插件沙箱已启动");
                    (Some(tx), Some(handle))
                }
                Ok(Err(e)) => {
                    error!("插件沙箱启动失败: {}", e);
                    (None, None)
                }
                Err(_) => {
                    error!("插件沙箱线程意外退出");
                    (None, None)
                }
            },
            Err(e) => {
                error!("无法创建插件沙箱线程: {}", e);
                (None, None)
            }
        };

        Arc::new(Self {
            commands: Mutex::new(commands),
            worker: Mutex::new(worker),
            available,
            next_module: AtomicU64::new(1),
        })
    }

    /// 关闭沙箱并等待工作线程退出，已加载的脚本全部释放
    ///
    /// 仍被持有的模块租约在之后释放时不再有任何效果
    pub fn shutdown(&self) {
        let Some(sender) = self.commands.lock().take() else {
            return;
        };
        let _ = sender.send(Command::Shutdown);
        drop(sender);
        if let Some(handle) = self.worker.lock().take() {
            if handle.join().is_err() {
                error!("插件沙箱线程异常退出");
            }
        }
        info!("插件沙箱已关闭");
    }

    /// 工作线程是否仍在运行
    pub fn is_running(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    fn request<T>(&self, build: impl FnOnce(Reply<T>) -> Command) -> Result<T, SandboxError> {
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        {
            let guard = self.commands.lock();
            let sender = guard
                .as_ref()
                .ok_or_else(|| SandboxError::Unavailable("插件沙箱已关闭".to_string()))?;
            sender
                .send(build(reply_tx))
                .map_err(|_| SandboxError::Unavailable("插件沙箱线程已退出".to_string()))?;
        }
        reply_rx
            .recv()
            .map_err(|_| SandboxError::Unavailable("插件沙箱线程已退出".to_string()))?
    }
}

impl ScriptSandbox for QuickJsSandbox {
    fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst) && self.commands.lock().is_some()
    }

    fn validate(&self, source: &str) -> Result<(), SandboxError> {
        self.request(|reply| Command::Validate {
            source: source.to_string(),
            reply,
        })
    }

    fn execute(&self, bundle_url: &str, source: &str) -> Result<ExecutedBundle, SandboxError> {
        let module = self.next_module.fetch_add(1, Ordering::SeqCst);
        let exports = self.request(|reply| Command::Execute {
            module,
            bundle_url: bundle_url.to_string(),
            source: source.to_string(),
            reply,
        })?;

        let sender = self.commands.lock().clone();
        let lease = ModuleLease::new(module, move || {
            if let Some(sender) = sender {
                let _ = sender.send(Command::Release { module });
            }
        });
        Ok(ExecutedBundle {
            lease: Arc::new(lease),
            exports,
        })
    }

    fn invoke(
        &self,
        module: ModuleId,
        function: u32,
        props: &serde_json::Value,
        capabilities: &serde_json::Value,
    ) -> Result<serde_json::Value, SandboxError> {
        let output = self.request(|reply| Command::Invoke {
            module,
            function,
            props: props.to_string(),
            capabilities: capabilities.to_string(),
            reply,
        })?;
        serde_json::from_str(&output)
            .map_err(|e| SandboxError::Execution(format!("渲染输出不是有效 JSON: {}", e)))
    }
}

impl Drop for QuickJsSandbox {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn internal(e: impl Display) -> SandboxError {
    SandboxError::Internal(e.to_string())
}

/// 已执行的插件包
///
/// 字段顺序决定释放顺序：脚本函数先于上下文释放
struct LoadedScript {
    functions: Vec<Persistent<Function<'static>>>,
    invoke: Persistent<Function<'static>>,
    bundle_url: String,
    context: Context,
}

struct Worker {
    modules: HashMap<ModuleId, LoadedScript>,
    options: SandboxOptions,
    host_modules_json: String,
    deadline: Arc<AtomicU64>,
    clock: Instant,
    runtime: Runtime,
}

impl Worker {
    fn new(options: SandboxOptions) -> Result<Self, SandboxError> {
        let runtime = Runtime::new()
            .map_err(|e| SandboxError::Unavailable(format!("无法创建脚本运行时: {}", e)))?;
        runtime.set_memory_limit(options.memory_limit);
        runtime.set_max_stack_size(options.max_stack_size);

        let deadline = Arc::new(AtomicU64::new(0));
        let clock = Instant::now();
        let handler_deadline = deadline.clone();
        runtime.set_interrupt_handler(Some(Box::new(move || {
            let limit = handler_deadline.load(Ordering::Relaxed);
            limit != 0 && clock.elapsed().as_millis() as u64 > limit
        })));

        let host_modules: serde_json::Map<String, serde_json::Value> = options
            .host_modules
            .iter()
            .map(|m| (m.name.clone(), serde_json::Value::String(m.source.clone())))
            .collect();

        Ok(Self {
            modules: HashMap::new(),
            host_modules_json: serde_json::Value::Object(host_modules).to_string(),
            options,
            deadline,
            clock,
            runtime,
        })
    }

    fn run(mut self, commands: Receiver<Command>) {
        while let Ok(command) = commands.recv() {
            match command {
                Command::Validate { source, reply } => {
                    let _ = reply.send(self.validate(&source));
                }
                Command::Execute {
                    module,
                    bundle_url,
                    source,
                    reply,
                } => {
                    let _ = reply.send(self.execute(module, bundle_url, &source));
                }
                Command::Invoke {
                    module,
                    function,
                    props,
                    capabilities,
                    reply,
                } => {
                    let _ = reply.send(self.invoke(module, function, &props, &capabilities));
                }
                Command::Release { module } => {
                    if let Some(script) = self.modules.remove(&module) {
                        debug!("释放插件模块 {} ({})", module, script.bundle_url);
                        drop(script);
                        self.runtime.run_gc();
                    }
                }
                Command::Shutdown => break,
            }
        }
        debug!("插件沙箱线程退出，释放 {} 个模块", self.modules.len());
    }

    fn new_context(&self) -> Result<Context, SandboxError> {
        Context::full(&self.runtime)
            .map_err(|e| SandboxError::Internal(format!("无法创建脚本上下文: {}", e)))
    }

    fn arm_deadline(&self) {
        let now = self.clock.elapsed().as_millis() as u64;
        self.deadline
            .store(now + self.options.execution_timeout_ms.max(1), Ordering::Relaxed);
    }

    fn disarm_deadline(&self) {
        self.deadline.store(0, Ordering::Relaxed);
    }

    fn check_phase(outcome: &Object<'_>) -> Result<(), SandboxError> {
        let phase: String = outcome.get("phase").map_err(internal)?;
        let message = || {
            outcome
                .get::<_, String>("message")
                .unwrap_or_else(|_| "未知错误".to_string())
        };
        match phase.as_str() {
            "parse" => Err(SandboxError::Syntax(message())),
            "execute" => Err(SandboxError::Execution(message())),
            _ => Ok(()),
        }
    }

    fn validate(&self, source: &str) -> Result<(), SandboxError> {
        let context = self.new_context()?;
        self.arm_deadline();
        let result = context.with(|ctx| -> Result<(), SandboxError> {
            let bootstrap: Function = ctx.eval(BOOTSTRAP_SOURCE).catch(&ctx).map_err(internal)?;
            let outcome: Object = bootstrap
                .call((
                    source,
                    "{}",
                    self.options.fallback_global.as_str(),
                    0u32,
                    true,
                ))
                .catch(&ctx)
                .map_err(internal)?;
            Self::check_phase(&outcome)
        });
        self.disarm_deadline();
        result
    }

    fn execute(
        &mut self,
        module: ModuleId,
        bundle_url: String,
        source: &str,
    ) -> Result<serde_json::Value, SandboxError> {
        let context = self.new_context()?;
        self.arm_deadline();
        let captured = context.with(
            |ctx| -> Result<
                (
                    String,
                    Vec<Persistent<Function<'static>>>,
                    Persistent<Function<'static>>,
                ),
                SandboxError,
            > {
                let bootstrap: Function =
                    ctx.eval(BOOTSTRAP_SOURCE).catch(&ctx).map_err(internal)?;
                let invoke: Function = ctx.eval(INVOKE_SOURCE).catch(&ctx).map_err(internal)?;
                let outcome: Object = bootstrap
                    .call((
                        source,
                        self.host_modules_json.as_str(),
                        self.options.fallback_global.as_str(),
                        self.options.max_export_depth,
                        false,
                    ))
                    .catch(&ctx)
                    .map_err(|e| SandboxError::Execution(e.to_string()))?;
                Self::check_phase(&outcome)?;

                let json: String = outcome.get("json").map_err(internal)?;
                let functions: Array = outcome.get("functions").map_err(internal)?;
                let mut saved = Vec::with_capacity(functions.len());
                for index in 0..functions.len() {
                    let function: Function = functions.get(index).map_err(internal)?;
                    saved.push(Persistent::save(&ctx, function));
                }
                Ok((json, saved, Persistent::save(&ctx, invoke)))
            },
        );
        self.disarm_deadline();

        let (json, functions, invoke) = captured?;
        let exports = serde_json::from_str(&json)
            .map_err(|e| SandboxError::Internal(format!("导出快照解析失败: {}", e)))?;
        if functions.is_empty() {
            warn!("插件包 {} 未导出任何函数", bundle_url);
        }
        debug!(
            "插件模块 {} 执行完成: {} ({} 个函数)",
            module,
            bundle_url,
            functions.len()
        );
        self.modules.insert(
            module,
            LoadedScript {
                functions,
                invoke,
                bundle_url,
                context,
            },
        );
        Ok(exports)
    }

    fn invoke(
        &self,
        module: ModuleId,
        function: u32,
        props: &str,
        capabilities: &str,
    ) -> Result<String, SandboxError> {
        let script = self
            .modules
            .get(&module)
            .ok_or_else(|| SandboxError::Execution(format!("插件模块 {} 已释放", module)))?;
        let target = script
            .functions
            .get(function as usize)
            .cloned()
            .ok_or_else(|| {
                SandboxError::Execution(format!("插件模块 {} 没有第 {} 个函数", module, function))
            })?;

        self.arm_deadline();
        let result = script.context.with(|ctx| -> Result<String, SandboxError> {
            let invoke = script.invoke.clone().restore(&ctx).map_err(internal)?;
            let target = target.restore(&ctx).map_err(internal)?;
            let output: String = invoke
                .call((target, props, capabilities))
                .catch(&ctx)
                .map_err(|e| SandboxError::Execution(e.to_string()))?;
            Ok(output)
        });
        self.disarm_deadline();
        result
    }
}
