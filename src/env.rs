//! 统一的环境变量管理系统
//!
//! 提供类型安全、可验证的环境变量访问，以及日志初始化

use std::env;
use std::fmt;

/// 环境变量解析错误
#[derive(Debug, Clone)]
pub struct EnvError {
    pub variable: String,
    pub message: String,
}

impl fmt::Display for EnvError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Environment variable '{}': {}", self.variable, self.message)
    }
}

impl std::error::Error for EnvError {}

pub type EnvResult<T> = Result<T, EnvError>;

/// 环境变量访问器特性
pub trait EnvVar<T> {
    const NAME: &'static str;
    const DEFAULT: Option<T>;
    const DESCRIPTION: &'static str;

    fn parse(value: &str) -> EnvResult<T>;

    fn get() -> EnvResult<T> {
        match env::var(Self::NAME) {
            Ok(value) => Self::parse(&value),
            Err(_) => {
                if let Some(default) = Self::DEFAULT {
                    Ok(default)
                } else {
                    Err(EnvError {
                        variable: Self::NAME.to_string(),
                        message: "Required environment variable not set".to_string(),
                    })
                }
            }
        }
    }

    fn get_or_default(default: T) -> T {
        Self::get().unwrap_or(default)
    }
}

/// 核心环境变量定义
pub mod core {
    use super::*;

    /// 日志过滤指令
    pub struct LogFilter;
    impl EnvVar<String> for LogFilter {
        const NAME: &'static str = "LINGO_TRANS_LOG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str =
            "Tracing filter directives, e.g. `info` or `lingo_trans=debug` (falls back to RUST_LOG)";

        fn parse(value: &str) -> EnvResult<String> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Filter must not be empty".to_string(),
                });
            }
            Ok(trimmed.to_string())
        }
    }

    /// 设置文件路径
    pub struct ConfigPath;
    impl EnvVar<String> for ConfigPath {
        const NAME: &'static str = "LINGO_TRANS_CONFIG";
        const DEFAULT: Option<String> = None;
        const DESCRIPTION: &'static str = "Path of the TOML settings file (`~` is expanded)";

        fn parse(value: &str) -> EnvResult<String> {
            let trimmed = value.trim();
            if trimmed.is_empty() {
                return Err(EnvError {
                    variable: Self::NAME.to_string(),
                    message: "Path must not be empty".to_string(),
                });
            }
            Ok(shellexpand::tilde(trimmed).into_owned())
        }
    }

    /// 禁用颜色输出
    pub struct NoColor;
    impl EnvVar<bool> for NoColor {
        const NAME: &'static str = "NO_COLOR";
        const DEFAULT: Option<bool> = Some(false);
        const DESCRIPTION: &'static str = "Disable colored output when set to any value";

        fn parse(value: &str) -> EnvResult<bool> {
            // NO_COLOR 遵循标准：任何值都表示禁用颜色
            Ok(!value.is_empty())
        }
    }
}

/// 网络相关环境变量
pub mod network {
    use super::*;

    /// 单次调用的最大尝试次数
    pub struct MaxRetries;
    impl EnvVar<usize> for MaxRetries {
        const NAME: &'static str = "LINGO_TRANS_MAX_RETRIES";
        const DEFAULT: Option<usize> = Some(3);
        const DESCRIPTION: &'static str = "Maximum attempts per provider request (1-10)";

        fn parse(value: &str) -> EnvResult<usize> {
            parse_positive_usize(value, Self::NAME, 1, 10)
        }
    }
}

fn parse_positive_usize(value: &str, var_name: &str, min: usize, max: usize) -> EnvResult<usize> {
    let num: usize = value.trim().parse().map_err(|_| EnvError {
        variable: var_name.to_string(),
        message: "Must be a valid positive number".to_string(),
    })?;

    if num < min {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} is below minimum {}", num, min),
        });
    }

    if num > max {
        return Err(EnvError {
            variable: var_name.to_string(),
            message: format!("Value {} exceeds maximum {}", num, max),
        });
    }

    Ok(num)
}

/// 初始化日志系统
///
/// 过滤指令依次取自 `LINGO_TRANS_LOG`、`RUST_LOG`，都未设置时为 `info`。
/// 重复调用是安全的，只有第一次会安装全局订阅者。
pub fn init_tracing() {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = core::LogFilter::get()
        .ok()
        .and_then(|directives| EnvFilter::try_new(directives).ok())
        .or_else(|| EnvFilter::try_from_default_env().ok())
        .unwrap_or_else(|| EnvFilter::new("info"));

    let no_color = core::NoColor::get_or_default(false);

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(!no_color)
                .with_target(false),
        )
        .try_init();
}

/// 环境变量文档生成器
pub fn generate_env_docs() -> String {
    let mut docs = String::new();
    docs.push_str("# Environment Variables\n\n");
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::LogFilter::NAME,
        core::LogFilter::DESCRIPTION,
        core::LogFilter::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::ConfigPath::NAME,
        core::ConfigPath::DESCRIPTION,
        core::ConfigPath::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        core::NoColor::NAME,
        core::NoColor::DESCRIPTION,
        core::NoColor::DEFAULT
    ));
    docs.push_str(&format!(
        "- `{}`: {} (default: {:?})\n",
        network::MaxRetries::NAME,
        network::MaxRetries::DESCRIPTION,
        network::MaxRetries::DEFAULT
    ));
    docs.push_str(
        "- `LINGO_TRANS_<FIELD>`: overrides a settings field, e.g. `LINGO_TRANS_MODEL`, `LINGO_TRANS_OPENAI_API_KEY`\n",
    );
    docs
}
