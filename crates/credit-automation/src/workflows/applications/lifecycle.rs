//! Two-axis lifecycle (stage × status) of a credit application.
//!
//! Intake events only move the stage while the application is a draft; decision events only move
//! the status. Every transition goes through [`transition`] so illegal moves surface as
//! [`LifecycleError`] instead of silently overwriting fields.

use serde::{Deserialize, Serialize};

use super::domain::{ApplicationStage, ApplicationStatus};

pub const INITIAL_STAGE: ApplicationStage = ApplicationStage::Company;
pub const INITIAL_STATUS: ApplicationStatus = ApplicationStatus::Draft;

/// Snapshot of both lifecycle axes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleState {
    pub stage: ApplicationStage,
    pub status: ApplicationStatus,
}

impl LifecycleState {
    pub const fn initial() -> Self {
        Self {
            stage: INITIAL_STAGE,
            status: INITIAL_STATUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LifecycleEvent {
    CompanyStored,
    StakeholdersStored,
    CreditLimitStored { requires_disclosure: bool },
    Submitted { requires_disclosure: bool },
    AutomationQueued,
    AutoApproved,
    Referred,
    UnderwriterApproved,
    UnderwriterDeclined,
    Withdrawn,
    Cancelled,
    Surrendered,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LifecycleError {
    #[error("cannot apply {event:?} to an application in stage {stage:?} with status {status}")]
    InvalidTransition {
        stage: ApplicationStage,
        status: ApplicationStatus,
        event: LifecycleEvent,
    },
    #[error("stakeholder details must be stored before the credit limit for this entity type")]
    StakeholdersRequired,
    #[error("intake is incomplete: stage {found:?} reached, {required:?} required to submit")]
    IntakeIncomplete {
        found: ApplicationStage,
        required: ApplicationStage,
    },
}

/// Final intake stage an entity must reach before submission.
pub const fn final_intake_stage(requires_disclosure: bool) -> ApplicationStage {
    if requires_disclosure {
        ApplicationStage::CreditLimit
    } else {
        ApplicationStage::Stakeholders
    }
}

pub fn transition(
    current: LifecycleState,
    event: LifecycleEvent,
) -> Result<LifecycleState, LifecycleError> {
    use ApplicationStatus as Status;

    let invalid = || LifecycleError::InvalidTransition {
        stage: current.stage,
        status: current.status,
        event,
    };

    match (current.status, event) {
        (Status::Draft, LifecycleEvent::CompanyStored) => Ok(LifecycleState {
            stage: ApplicationStage::Company,
            status: Status::Draft,
        }),
        (Status::Draft, LifecycleEvent::StakeholdersStored) => Ok(LifecycleState {
            stage: ApplicationStage::Stakeholders,
            status: Status::Draft,
        }),
        (Status::Draft, LifecycleEvent::CreditLimitStored { requires_disclosure }) => {
            if requires_disclosure && current.stage < ApplicationStage::Stakeholders {
                return Err(LifecycleError::StakeholdersRequired);
            }
            Ok(LifecycleState {
                stage: final_intake_stage(requires_disclosure),
                status: Status::Draft,
            })
        }
        (Status::Draft, LifecycleEvent::Submitted { requires_disclosure }) => {
            let required = final_intake_stage(requires_disclosure);
            if current.stage < required {
                return Err(LifecycleError::IntakeIncomplete {
                    found: current.stage,
                    required,
                });
            }
            Ok(LifecycleState {
                stage: current.stage,
                status: Status::Submitted,
            })
        }
        (Status::Submitted, LifecycleEvent::AutomationQueued) => Ok(LifecycleState {
            stage: current.stage,
            status: Status::PendingAutomation,
        }),
        (Status::Submitted | Status::PendingAutomation, LifecycleEvent::AutoApproved) => {
            Ok(LifecycleState {
                stage: current.stage,
                status: Status::Approved,
            })
        }
        (Status::Submitted | Status::PendingAutomation, LifecycleEvent::Referred) => {
            Ok(LifecycleState {
                stage: current.stage,
                status: Status::ReviewApplication,
            })
        }
        (Status::ReviewApplication, LifecycleEvent::UnderwriterApproved) => Ok(LifecycleState {
            stage: current.stage,
            status: Status::Approved,
        }),
        (Status::ReviewApplication, LifecycleEvent::UnderwriterDeclined) => Ok(LifecycleState {
            stage: current.stage,
            status: Status::Declined,
        }),
        (
            Status::Draft | Status::Submitted | Status::ReviewApplication,
            LifecycleEvent::Withdrawn,
        ) => Ok(LifecycleState {
            stage: current.stage,
            status: Status::Withdrawn,
        }),
        (Status::Draft | Status::ReviewApplication, LifecycleEvent::Cancelled) => {
            Ok(LifecycleState {
                stage: current.stage,
                status: Status::Cancelled,
            })
        }
        (Status::Approved, LifecycleEvent::Surrendered) => Ok(LifecycleState {
            stage: current.stage,
            status: Status::Surrendered,
        }),
        _ => Err(invalid()),
    }
}
