//! CLI value enums and domain type conversions.

use clap::ValueEnum;

use crate::domain::DependencyType;
use crate::impact::ChangeType;

/// Dependency type for CLI arguments
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DependencyTypeArg {
    /// Prerequisite finishes before the dependent starts
    #[default]
    #[value(name = "finish-to-start")]
    FinishToStart,
    /// Prerequisite starts before the dependent starts
    #[value(name = "start-to-start")]
    StartToStart,
    /// Prerequisite finishes before the dependent finishes
    #[value(name = "finish-to-finish")]
    FinishToFinish,
    /// Prerequisite starts before the dependent finishes
    #[value(name = "start-to-finish")]
    StartToFinish,
}

impl From<DependencyTypeArg> for DependencyType {
    fn from(arg: DependencyTypeArg) -> Self {
        match arg {
            DependencyTypeArg::FinishToStart => DependencyType::FinishToStart,
            DependencyTypeArg::StartToStart => DependencyType::StartToStart,
            DependencyTypeArg::FinishToFinish => DependencyType::FinishToFinish,
            DependencyTypeArg::StartToFinish => DependencyType::StartToFinish,
        }
    }
}

/// Change type for the `impact` command
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChangeTypeArg {
    /// Scope or content change
    #[default]
    Modify,
    /// Task removal
    Remove,
    /// Schedule change
    Reschedule,
    /// Priority change
    Reprioritize,
    /// Status change
    #[value(name = "status-change")]
    StatusChange,
}

impl From<ChangeTypeArg> for ChangeType {
    fn from(arg: ChangeTypeArg) -> Self {
        match arg {
            ChangeTypeArg::Modify => ChangeType::Modify,
            ChangeTypeArg::Remove => ChangeType::Remove,
            ChangeTypeArg::Reschedule => ChangeType::Reschedule,
            ChangeTypeArg::Reprioritize => ChangeType::Reprioritize,
            ChangeTypeArg::StatusChange => ChangeType::StatusChange,
        }
    }
}
