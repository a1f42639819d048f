#![deny(clippy::all, warnings)]

mod core;

pub(crate) use crate::core::config;
pub(crate) use crate::core::state;
pub(crate) use crate::core::tooling;

pub use crate::core::config::context::{CommandContext, CommandInfo};
pub use crate::core::config::{Config, GlobalOptions, PathsConfig};
pub use crate::core::runtime::effects::{
    CronEditor, Effects, Notifier, PlatformCli, PlatformScope, ServiceManager, SharedEffects,
    SystemEffects,
};
pub use crate::core::runtime::process::RunOutput;
pub use crate::core::runtime::CommandGroup;
pub use crate::core::tooling::errors::EngineError;
pub use crate::core::tooling::outcome::{CommandStatus, ExecutionOutcome};

pub use crate::core::cleanup::{cleanup, CleanupRequest, CleanupScan};
pub use crate::core::enumerate::list_installed;
pub use crate::core::generate::{generate_all, GenerateOutcome, GenerateRequest, GenerateSummary};
pub use crate::core::manager::{
    block_app, create_alias, export_state, get_preference, import_state, info_wrapper,
    list_wrappers, remove_alias, remove_hook, remove_wrapper, search_wrappers, set_env, set_hook,
    set_preference, show_config, unblock_app, unset_env, AliasRequest, HookKind, RemoveRequest,
};
pub use crate::core::reconcile::{reconcile, ReconcileSummary};
pub use crate::core::service::{
    monitor, systemd_control, systemd_setup, MonitorRequest, SystemdAction, PATH_UNIT,
    SERVICE_UNIT, TIMER_UNIT,
};
pub use crate::core::state::store::ConfigStore;
pub use crate::core::wrapper::probe::{probe_wrapper, scan_bin_dir, WrapperProbe, WRAPPER_MARKER};
pub use crate::core::wrapper::template::{render_wrapper, WrapperContext, TEMPLATE_VERSION};

pub use crate::core::runtime::{
    engine_error_outcome, format_status_message, to_json_response, FPWRAP_VERSION,
};
