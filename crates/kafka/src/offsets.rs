//! Where a consumer starts reading.
//!
//! `--from-beginning`, `--offset` and `--partition` are resolved once, before
//! subscribing, into a [`StartPolicy`]. On every partition-assignment event
//! [`plan_assignment`] turns the policy's [`RebalanceInstruction`] and the
//! assigned partitions into the positions the consumer seeks to.

use crate::error::{Error, Result};
use rdkafka::Offset;

/// Logical or explicit start position for every assigned partition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OffsetMode {
    Latest,
    Earliest,
    Explicit(i64),
}

impl OffsetMode {
    pub fn to_offset(self) -> Offset {
        match self {
            OffsetMode::Latest => Offset::End,
            OffsetMode::Earliest => Offset::Beginning,
            OffsetMode::Explicit(offset) => Offset::Offset(offset),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RebalanceInstruction {
    pub offset_mode: OffsetMode,
    /// Only this partition is consumed when set
    pub partition_filter: Option<i32>,
}

impl RebalanceInstruction {
    pub fn accepts(&self, partition: i32) -> bool {
        self.partition_filter.map_or(true, |p| p == partition)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartPolicy {
    /// Leave positions to the group's committed offsets
    ResumeGroup,
    /// Seek every assigned partition per the instruction
    Override(RebalanceInstruction),
}

impl StartPolicy {
    pub fn instruction(&self) -> Option<&RebalanceInstruction> {
        match self {
            StartPolicy::ResumeGroup => None,
            StartPolicy::Override(instruction) => Some(instruction),
        }
    }
}

/// Start-position flags as given on the command line.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OffsetFlags {
    pub from_beginning: bool,
    pub offset: Option<i64>,
    pub partition: Option<i32>,
}

impl OffsetFlags {
    fn any(&self) -> bool {
        self.from_beginning || self.offset.is_some() || self.partition.is_some()
    }
}

/// Resolve the start flags into a policy, rejecting invalid combinations.
///
/// `named_group` is true when the user chose the consumer group; only then,
/// and only without any start flag, do committed offsets take precedence.
pub fn resolve_start_policy(flags: OffsetFlags, named_group: bool) -> Result<StartPolicy> {
    if flags.from_beginning && flags.offset.is_some() {
        return Err(Error::ConfigValidation(
            "--from-beginning and --offset cannot be used together".to_string(),
        ));
    }
    if let Some(offset) = flags.offset {
        if offset < 0 {
            return Err(Error::ConfigValidation(format!(
                "--offset must be non-negative, got {offset}"
            )));
        }
    }
    if let Some(partition) = flags.partition {
        if partition < 0 {
            return Err(Error::ConfigValidation(format!(
                "--partition must be non-negative, got {partition}"
            )));
        }
    }

    if named_group && !flags.any() {
        return Ok(StartPolicy::ResumeGroup);
    }

    let offset_mode = match (flags.from_beginning, flags.offset) {
        (true, _) => OffsetMode::Earliest,
        (false, Some(offset)) => OffsetMode::Explicit(offset),
        (false, None) => OffsetMode::Latest,
    };

    Ok(StartPolicy::Override(RebalanceInstruction {
        offset_mode,
        partition_filter: flags.partition,
    }))
}

/// Start positions for one assignment event. Partitions outside the filter
/// are left out, so the consumer never reads them.
pub fn plan_assignment(
    instruction: &RebalanceInstruction,
    assigned: &[(String, i32)],
) -> Vec<(String, i32, OffsetMode)> {
    assigned
        .iter()
        .filter(|(_, partition)| instruction.accepts(*partition))
        .map(|(topic, partition)| (topic.clone(), *partition, instruction.offset_mode))
        .collect()
}
