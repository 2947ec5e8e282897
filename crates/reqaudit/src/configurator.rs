//! Resolve [`AuditOptions`] into an emitter and correlation header
//!
//! Misconfiguration never stops the host from starting: every problem is
//! logged as a warning, returned in [`ResolvedAudit::warnings`], and the
//! console emitter is used instead of a variant that cannot be built.
//!
//! # Example
//!
//! ```no_run
//! use reqaudit::{configurator, AuditLayer, AuditOptions};
//!
//! # async fn example() {
//! let options = AuditOptions::from_env();
//! let resolved = configurator::resolve(&options).await;
//! let layer = AuditLayer::from_resolved(resolved, &options);
//! # }
//! ```

use http::HeaderName;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::{AuditOptions, EMITTER_AWS_SNS, EMITTER_CONSOLE};
use crate::emitter::{ConsoleEmitter, Emitter, NotificationEmitter};
use crate::notify::{NotificationPublisher, SnsConfig, SnsPublisher};

/// Problem found while resolving options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigWarning {
    /// No correlation header configured
    MissingResponseHeader,
    /// The configured header name is not a valid HTTP header name
    InvalidResponseHeader { value: String },
    /// A required option for the requested emitter is absent
    MissingOption {
        emitter: &'static str,
        option: &'static str,
    },
    /// An optional credential is absent; the default credential chain is used
    MissingCredential { option: &'static str },
    /// The requested emitter name is not recognized
    UnknownEmitter { name: String },
    /// The requested emitter could not be built and the console is used instead
    FellBackToConsole { requested: String },
}

impl std::fmt::Display for ConfigWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingResponseHeader => write!(
                f,
                "Response header not configured for audit module; API responses will not contain the request ID"
            ),
            Self::InvalidResponseHeader { value } => {
                write!(f, "Invalid audit response header name {:?}; header disabled", value)
            },
            Self::MissingOption { emitter, option } => {
                write!(f, "Audit emitter {} is missing required option \"{}\"", emitter, option)
            },
            Self::MissingCredential { option } => {
                write!(f, "Audit notification option \"{}\" not set", option)
            },
            Self::UnknownEmitter { name } => write!(f, "Unknown audit emitter {:?}", name),
            Self::FellBackToConsole { requested } => write!(
                f,
                "Audit emitter {:?} not configured with provided options; configuring console emitter by default",
                requested
            ),
        }
    }
}

/// Which emitter the options select, after validation
#[derive(Debug, Clone)]
pub enum EmitterPlan {
    Console,
    Sns(SnsConfig),
}

/// Validated options, before any client is constructed
#[derive(Debug, Clone)]
pub struct AuditPlan {
    pub emitter: EmitterPlan,
    pub response_header: Option<HeaderName>,
    pub quiet_emit: bool,
    pub warnings: Vec<ConfigWarning>,
}

/// Emitter and header ready to be closed over by the middleware
#[derive(Debug, Clone)]
pub struct ResolvedAudit {
    pub emitter: Arc<dyn Emitter>,
    pub response_header: Option<HeaderName>,
    pub warnings: Vec<ConfigWarning>,
}

impl ResolvedAudit {
    /// Whether the requested emitter was replaced by the console
    pub fn fell_back(&self) -> bool {
        self.warnings
            .iter()
            .any(|w| matches!(w, ConfigWarning::FellBackToConsole { .. }))
    }
}

/// Validate `options` and log what was found
pub fn plan(options: &AuditOptions) -> AuditPlan {
    let mut warnings = Vec::new();
    let quiet = options.quiet_init;

    let response_header = parse_response_header(options, &mut warnings);

    let requested = options.emitter_name();
    let emitter = match requested {
        EMITTER_AWS_SNS => match sns_config(options, quiet, &mut warnings) {
            Some(config) => EmitterPlan::Sns(config),
            None => {
                warnings.push(ConfigWarning::FellBackToConsole {
                    requested: requested.to_string(),
                });
                EmitterPlan::Console
            },
        },
        EMITTER_CONSOLE => {
            if !quiet {
                info!("Configuring console audit emitter");
            }
            EmitterPlan::Console
        },
        other => {
            warnings.push(ConfigWarning::UnknownEmitter {
                name: other.to_string(),
            });
            warnings.push(ConfigWarning::FellBackToConsole {
                requested: other.to_string(),
            });
            EmitterPlan::Console
        },
    };

    for warning in &warnings {
        warn!("{}", warning);
    }

    AuditPlan {
        emitter,
        response_header,
        quiet_emit: options.quiet_emit,
        warnings,
    }
}

/// Resolve `options`, constructing the SNS client when selected
pub async fn resolve(options: &AuditOptions) -> ResolvedAudit {
    let plan = plan(options);
    let emitter: Arc<dyn Emitter> = match &plan.emitter {
        EmitterPlan::Console => Arc::new(ConsoleEmitter::new()),
        EmitterPlan::Sns(config) => {
            let publisher = SnsPublisher::new(config).await;
            Arc::new(NotificationEmitter::new(Arc::new(publisher), &config.topic_arn).quiet(plan.quiet_emit))
        },
    };

    finish_resolution(plan, emitter)
}

/// Resolve `options` using `publisher` for the notification emitter
pub fn resolve_with_publisher(
    options: &AuditOptions,
    publisher: Arc<dyn NotificationPublisher>,
) -> ResolvedAudit {
    let plan = plan(options);
    let emitter: Arc<dyn Emitter> = match &plan.emitter {
        EmitterPlan::Console => Arc::new(ConsoleEmitter::new()),
        EmitterPlan::Sns(config) => {
            Arc::new(NotificationEmitter::new(publisher, &config.topic_arn).quiet(plan.quiet_emit))
        },
    };

    finish_resolution(plan, emitter)
}

fn finish_resolution(plan: AuditPlan, emitter: Arc<dyn Emitter>) -> ResolvedAudit {
    ResolvedAudit {
        emitter,
        response_header: plan.response_header,
        warnings: plan.warnings,
    }
}

fn parse_response_header(
    options: &AuditOptions,
    warnings: &mut Vec<ConfigWarning>,
) -> Option<HeaderName> {
    let Some(value) = options.response_header.as_deref().map(str::trim).filter(|v| !v.is_empty())
    else {
        warnings.push(ConfigWarning::MissingResponseHeader);
        return None;
    };

    match HeaderName::from_bytes(value.as_bytes()) {
        Ok(name) => Some(name),
        Err(_) => {
            warnings.push(ConfigWarning::InvalidResponseHeader {
                value: value.to_string(),
            });
            None
        },
    }
}

fn sns_config(
    options: &AuditOptions,
    quiet: bool,
    warnings: &mut Vec<ConfigWarning>,
) -> Option<SnsConfig> {
    if !quiet {
        info!("Configuring AWS SNS audit emitter from options");
    }

    let region = required(&options.aws_region, "aws_region", warnings)?;
    let topic_arn = required(&options.aws_topic_arn, "aws_topic_arn", warnings)?;

    let mut config = SnsConfig::new(region, topic_arn);
    config.endpoint = options.aws_endpoint.clone();

    match (&options.aws_key_id, &options.aws_secret) {
        (Some(key_id), Some(secret)) => {
            config = config.with_credentials(key_id, secret);
        },
        (key_id, secret) => {
            if key_id.is_none() {
                warnings.push(ConfigWarning::MissingCredential {
                    option: "aws_key_id",
                });
            }
            if secret.is_none() {
                warnings.push(ConfigWarning::MissingCredential {
                    option: "aws_secret",
                });
            }
        },
    }

    if !quiet {
        info!(
            aws_region = %config.region,
            aws_topic_arn = %config.topic_arn,
            aws_key_id = config.access_key_id.as_deref().unwrap_or_default(),
            "AWS SNS audit options accepted"
        );
    }

    Some(config)
}

fn required(
    value: &Option<String>,
    option: &'static str,
    warnings: &mut Vec<ConfigWarning>,
) -> Option<String> {
    match value.as_deref().map(str::trim).filter(|v| !v.is_empty()) {
        Some(v) => Some(v.to_string()),
        None => {
            warnings.push(ConfigWarning::MissingOption {
                emitter: EMITTER_AWS_SNS,
                option,
            });
            None
        },
    }
}
