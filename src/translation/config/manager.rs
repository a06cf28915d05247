//! 设置存储
//!
//! 提供统一的设置读取接口，支持文件配置、环境变量和默认值，以及变更订阅。
//! 读取永远不会失败：任何错误都会记录日志并回落到默认设置。

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{constants, sanitize_settings, Settings};
use crate::translation::error::{TranslationError, TranslationResult};

type SettingsHandler = Arc<dyn Fn(&Settings) + Send + Sync>;

/// 设置存储接口
#[async_trait]
pub trait SettingsStore: Send + Sync {
    /// 读取当前设置，失败时返回默认值
    async fn load_stored_settings(&self) -> Settings;

    /// 订阅设置变更，返回的句柄被调用 `unsubscribe` 或被丢弃时取消订阅
    fn subscribe(&self, handler: SettingsHandler) -> SettingsSubscription;
}

/// 订阅者注册表
#[derive(Default)]
struct Subscribers {
    next_id: AtomicU64,
    handlers: DashMap<u64, SettingsHandler>,
}

impl Subscribers {
    fn add(self: &Arc<Self>, handler: SettingsHandler) -> SettingsSubscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers.insert(id, handler);
        SettingsSubscription {
            id,
            registry: Arc::downgrade(self),
        }
    }

    fn notify(&self, settings: &Settings) {
        // 先收集再调用，避免回调中再次订阅时持有分片锁
        let handlers: Vec<SettingsHandler> =
            self.handlers.iter().map(|e| e.value().clone()).collect();
        for handler in handlers {
            handler(settings);
        }
    }
}

/// 设置订阅句柄
#[must_use = "dropping the subscription unsubscribes immediately"]
pub struct SettingsSubscription {
    id: u64,
    registry: Weak<Subscribers>,
}

impl SettingsSubscription {
    pub fn unsubscribe(self) {
        // Drop 完成实际的移除
    }
}

impl Drop for SettingsSubscription {
    fn drop(&mut self) {
        if let Some(registry) = self.registry.upgrade() {
            registry.handlers.remove(&self.id);
        }
    }
}

/// 内存中的设置存储
pub struct MemorySettingsStore {
    settings: RwLock<Settings>,
    subscribers: Arc<Subscribers>,
}

impl MemorySettingsStore {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: RwLock::new(settings),
            subscribers: Arc::new(Subscribers::default()),
        }
    }

    /// 替换设置并通知所有订阅者
    pub fn update(&self, settings: Settings) {
        match self.settings.write() {
            Ok(mut guard) => *guard = settings.clone(),
            Err(poisoned) => *poisoned.into_inner() = settings.clone(),
        }
        self.subscribers.notify(&settings);
    }

    fn snapshot(&self) -> Settings {
        match self.settings.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}

impl Default for MemorySettingsStore {
    fn default() -> Self {
        Self::new(Settings::default())
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load_stored_settings(&self) -> Settings {
        self.snapshot()
    }

    fn subscribe(&self, handler: SettingsHandler) -> SettingsSubscription {
        self.subscribers.add(handler)
    }
}

/// 基于 TOML 文件的设置存储
pub struct FileSettingsStore {
    path: PathBuf,
    subscribers: Arc<Subscribers>,
}

impl FileSettingsStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path: PathBuf = path.into();
        let expanded = shellexpand::tilde(&path.to_string_lossy()).into_owned();
        Self {
            path: PathBuf::from(expanded),
            subscribers: Arc::new(Subscribers::default()),
        }
    }

    /// 按 `LINGO_TRANS_CONFIG`、搜索路径的顺序定位设置文件
    pub fn discover() -> Self {
        Self::load_dotenv();

        use crate::env::{core, EnvVar};
        if let Ok(path) = core::ConfigPath::get() {
            return Self::new(path);
        }

        for path in constants::CONFIG_PATHS {
            let expanded_path = shellexpand::tilde(path);
            if Path::new(expanded_path.as_ref()).exists() {
                tracing::info!("找到设置文件: {}", expanded_path);
                return Self::new(expanded_path.as_ref());
            }
        }

        tracing::info!("未找到设置文件，使用默认路径 {}", constants::CONFIG_PATHS[0]);
        Self::new(constants::CONFIG_PATHS[0])
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 读取文件与环境变量合并后的原始值
    fn load_raw(&self) -> TranslationResult<Value> {
        let builder = config::Config::builder()
            .add_source(
                config::File::from(self.path.as_path())
                    .format(config::FileFormat::Toml)
                    .required(false),
            )
            .add_source(config::Environment::with_prefix("LINGO_TRANS"));

        let merged = builder.build()?;
        Ok(merged.try_deserialize::<Value>()?)
    }

    /// 保存设置（尽力而为）并通知订阅者
    pub async fn save(&self, settings: &Settings) -> TranslationResult<()> {
        let content = toml::to_string_pretty(settings)?;

        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent).await?;
            }
        }
        tokio::fs::write(&self.path, content).await.map_err(|e| {
            TranslationError::ConfigError(format!(
                "写入设置文件失败 {}: {}",
                self.path.display(),
                e
            ))
        })?;

        tracing::info!("设置已保存: {}", self.path.display());
        self.subscribers.notify(settings);
        Ok(())
    }

    /// 加载 .env 文件
    fn load_dotenv() {
        let env_files = [".env.local", ".env.development", ".env.production", ".env"];

        for env_file in &env_files {
            if Path::new(env_file).exists() && dotenv::from_filename(env_file).is_ok() {
                tracing::info!("已加载环境变量文件: {}", env_file);
                break;
            }
        }
    }
}

#[async_trait]
impl SettingsStore for FileSettingsStore {
    async fn load_stored_settings(&self) -> Settings {
        match self.load_raw() {
            Ok(raw) => sanitize_settings(&raw),
            Err(e) => {
                tracing::warn!("读取设置失败，使用默认设置: {}", e);
                Settings::default()
            }
        }
    }

    fn subscribe(&self, handler: SettingsHandler) -> SettingsSubscription {
        self.subscribers.add(handler)
    }
}
