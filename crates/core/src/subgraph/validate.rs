//! Structural validation of a sub-graph composition.
//!
//! Three independent checks gate a sub-graph before it is handed to the
//! layout/assembly stage:
//! 1. every basic block is placed in at most one block description;
//! 2. every placed code basic block has well-formed successors that stay
//!    inside the composition (or leave it through an explicit external target);
//! 3. every external referrer of the original block still lands on a placed
//!    basic block.
//!
//! All checks are read-only traversals of the arena and description list.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::Serialize;
use thiserror::Error;
use tracing::warn;

use crate::model::{BasicBlockId, BasicBlockType, BranchCondition, Referrer, SuccessorTarget};
use crate::subgraph::BasicBlockSubGraph;

/// The check a violation belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationCheck {
    DescriptionMembership,
    Successors,
    Referrers,
}

impl ValidationCheck {
    pub const ALL: [ValidationCheck; 3] = [
        ValidationCheck::DescriptionMembership,
        ValidationCheck::Successors,
        ValidationCheck::Referrers,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ValidationCheck::DescriptionMembership => "description_membership",
            ValidationCheck::Successors => "successors",
            ValidationCheck::Referrers => "referrers",
        }
    }
}

/// A single structural problem, naming the entity at fault.
#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Violation {
    #[error("description '{description}' references unknown basic block {block}")]
    UnknownBasicBlock { block: BasicBlockId, description: String },

    #[error("{block} appears more than once in description '{description}'")]
    RepeatedInDescription { block: BasicBlockId, description: String },

    #[error("{block} is placed in both '{first}' and '{second}'")]
    MultipleDescriptions { block: BasicBlockId, first: String, second: String },

    #[error("{disposition} basic block {block} has successors")]
    SuccessorsOnNonCode { block: BasicBlockId, disposition: &'static str },

    #[error("{block} has {count} successors; at most two are allowed")]
    TooManySuccessors { block: BasicBlockId, count: usize },

    #[error("{block} has a single successor with condition {condition:?}; it must be unconditional")]
    ConditionalSoleSuccessor { block: BasicBlockId, condition: BranchCondition },

    #[error("{block} has successors with non-inverse conditions {first:?} and {second:?}")]
    MismatchedConditions { block: BasicBlockId, first: BranchCondition, second: BranchCondition },

    #[error("{block} has a successor to {target}, which is not placed in any description")]
    DanglingSuccessor { block: BasicBlockId, target: BasicBlockId },

    #[error("referrer {referrer} no longer lands on a placed basic block")]
    LostReferrer { referrer: Referrer },

    #[error("referrer {referrer} is claimed by several placed basic blocks: {blocks:?}")]
    AmbiguousReferrer { referrer: Referrer, blocks: Vec<BasicBlockId> },
}

impl Violation {
    pub fn check(&self) -> ValidationCheck {
        match self {
            Violation::UnknownBasicBlock { .. }
            | Violation::RepeatedInDescription { .. }
            | Violation::MultipleDescriptions { .. } => ValidationCheck::DescriptionMembership,
            Violation::SuccessorsOnNonCode { .. }
            | Violation::TooManySuccessors { .. }
            | Violation::ConditionalSoleSuccessor { .. }
            | Violation::MismatchedConditions { .. }
            | Violation::DanglingSuccessor { .. } => ValidationCheck::Successors,
            Violation::LostReferrer { .. } | Violation::AmbiguousReferrer { .. } => {
                ValidationCheck::Referrers
            }
        }
    }
}

/// Outcome of running every check.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.violations.is_empty()
    }

    pub fn passed(&self, check: ValidationCheck) -> bool {
        !self.violations.iter().any(|v| v.check() == check)
    }

    /// Checks with at least one violation, in check order.
    pub fn failed_checks(&self) -> Vec<ValidationCheck> {
        let failed: BTreeSet<ValidationCheck> =
            self.violations.iter().map(Violation::check).collect();
        failed.into_iter().collect()
    }

    pub fn violations_for(&self, check: ValidationCheck) -> impl Iterator<Item = &Violation> + '_ {
        self.violations.iter().filter(move |v| v.check() == check)
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.violations.is_empty() {
            return write!(f, "valid");
        }
        for (idx, violation) in self.violations.iter().enumerate() {
            if idx > 0 {
                writeln!(f)?;
            }
            write!(f, "[{}] {}", violation.check().as_str(), violation)?;
        }
        Ok(())
    }
}

impl BasicBlockSubGraph<'_> {
    /// True if the composition passes all three checks.
    pub fn is_valid(&self) -> bool {
        self.maps_basic_blocks_to_at_most_one_description()
            && self.has_valid_successors()
            && self.has_valid_referrers()
    }

    /// Run every check and collect all violations.
    pub fn validate(&self) -> ValidationReport {
        let mut violations = Vec::new();
        self.check_description_membership(&mut violations);
        self.check_successors(&mut violations);
        self.check_referrers(&mut violations);
        if !violations.is_empty() {
            warn!(count = violations.len(), "basic-block sub-graph failed validation");
        }
        ValidationReport { violations }
    }

    pub fn maps_basic_blocks_to_at_most_one_description(&self) -> bool {
        let mut violations = Vec::new();
        self.check_description_membership(&mut violations);
        violations.is_empty()
    }

    pub fn has_valid_successors(&self) -> bool {
        let mut violations = Vec::new();
        self.check_successors(&mut violations);
        violations.is_empty()
    }

    pub fn has_valid_referrers(&self) -> bool {
        let mut violations = Vec::new();
        self.check_referrers(&mut violations);
        violations.is_empty()
    }

    fn check_description_membership(&self, violations: &mut Vec<Violation>) {
        let mut owner: BTreeMap<BasicBlockId, usize> = BTreeMap::new();
        let descriptions = self.block_descriptions();
        for (index, description) in descriptions.iter().enumerate() {
            for id in &description.basic_block_order {
                if !self.contains_basic_block(*id) {
                    violations.push(Violation::UnknownBasicBlock {
                        block: *id,
                        description: description.name.clone(),
                    });
                    continue;
                }
                match owner.get(id) {
                    None => {
                        owner.insert(*id, index);
                    }
                    Some(&first) if first == index => {
                        violations.push(Violation::RepeatedInDescription {
                            block: *id,
                            description: description.name.clone(),
                        });
                    }
                    Some(&first) => {
                        violations.push(Violation::MultipleDescriptions {
                            block: *id,
                            first: descriptions[first].name.clone(),
                            second: description.name.clone(),
                        });
                    }
                }
            }
        }
    }

    fn check_successors(&self, violations: &mut Vec<Violation>) {
        let placed = self.placements();
        for id in placed.keys() {
            let Some(bb) = self.basic_block(*id) else { continue };
            let successors = bb.successors();

            if bb.kind() != BasicBlockType::Code {
                if !successors.is_empty() {
                    violations.push(Violation::SuccessorsOnNonCode {
                        block: *id,
                        disposition: bb.kind().as_str(),
                    });
                }
                continue;
            }

            match successors {
                [] => {}
                [only] => {
                    if only.condition != BranchCondition::Always {
                        violations.push(Violation::ConditionalSoleSuccessor {
                            block: *id,
                            condition: only.condition,
                        });
                    }
                }
                [first, second] => {
                    if first.condition.inverse() != Some(second.condition) {
                        violations.push(Violation::MismatchedConditions {
                            block: *id,
                            first: first.condition,
                            second: second.condition,
                        });
                    }
                }
                _ => violations.push(Violation::TooManySuccessors {
                    block: *id,
                    count: successors.len(),
                }),
            }

            for successor in successors {
                if let SuccessorTarget::Internal(target) = successor.target {
                    if !placed.contains_key(&target) || !self.contains_basic_block(target) {
                        violations.push(Violation::DanglingSuccessor { block: *id, target });
                    }
                }
            }
        }
    }

    fn check_referrers(&self, violations: &mut Vec<Violation>) {
        let Some(original) = self.original_block() else { return };
        let placed = self.placements();

        // Basic blocks that explicitly carry each referrer, placed or not.
        let mut carriers: BTreeMap<Referrer, Vec<BasicBlockId>> = BTreeMap::new();
        for bb in self.basic_blocks() {
            for referrer in bb.referrers() {
                carriers.entry(*referrer).or_default().push(bb.id());
            }
        }

        for referrer in original.external_referrers() {
            match carriers.get(referrer) {
                Some(ids) => {
                    let placed_ids: Vec<BasicBlockId> =
                        ids.iter().copied().filter(|id| placed.contains_key(id)).collect();
                    match placed_ids.len() {
                        0 => violations.push(Violation::LostReferrer { referrer: *referrer }),
                        1 => {}
                        _ => violations.push(Violation::AmbiguousReferrer {
                            referrer: *referrer,
                            blocks: placed_ids,
                        }),
                    }
                }
                None => {
                    let landed = self
                        .find_basic_block_id(referrer.target_offset)
                        .is_some_and(|id| placed.contains_key(&id));
                    if !landed {
                        violations.push(Violation::LostReferrer { referrer: *referrer });
                    }
                }
            }
        }
    }
}
