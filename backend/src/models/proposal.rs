//! Proposal model
//!
//! A proposal is an immutable snapshot of one agent's suggested resolution
//! for the issue under deliberation. Revisions never edit a proposal in
//! place: they create a new snapshot linked to its parent, forming a
//! lineage in which exactly one version is active.
//!
//! # Critical Invariants
//!
//! 1. `proposal_id` is unique and monotonic per engine instance
//! 2. Id 0 is reserved for the system NoAction proposal
//! 3. At most one proposal per lineage has `active == true`
//! 4. `revision_number` equals the number of ancestors plus one

use serde::{Deserialize, Serialize};

/// Who authored a proposal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthorKind {
    /// Authored by a participating agent
    Agent,
    /// Authored by the engine itself (the NoAction default)
    System,
}

/// Proposal category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProposalKind {
    /// A regular agent-submitted proposal
    Standard,
    /// The synthetic "take no action" proposal with id 0
    NoAction,
}

/// Immutable snapshot of one proposal version.
///
/// # Example
///
/// ```rust
/// use roundtable_consensus_core_rs::models::Proposal;
///
/// let p = Proposal::standard(1, "Adopt plan A.".to_string(), "Agent_0", "Issue_1", 3);
/// assert_eq!(p.proposal_id, 1);
/// assert_eq!(p.revision_number, 1);
/// assert!(p.active);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Proposal {
    /// Sequential integer id (0 reserved for NoAction)
    pub proposal_id: u64,

    /// Opaque content string (the engine never interprets it)
    pub content: String,

    /// Agent that created this version
    pub author: String,

    /// Whether the author is an agent or the system
    pub author_type: AuthorKind,

    /// Standard or NoAction
    pub kind: ProposalKind,

    /// Previous version in the lineage, if this is a revision
    pub parent_id: Option<u64>,

    /// Version number within the lineage, starting at 1
    pub revision_number: u32,

    /// True only for the latest version in a lineage
    pub active: bool,

    /// Tick at which this version was created
    pub tick: usize,

    /// Issue this proposal belongs to
    pub issue_id: String,
}

impl Proposal {
    /// Create a first-revision standard proposal authored by an agent.
    pub fn standard(
        proposal_id: u64,
        content: String,
        author: &str,
        issue_id: &str,
        tick: usize,
    ) -> Self {
        Self {
            proposal_id,
            content,
            author: author.to_string(),
            author_type: AuthorKind::Agent,
            kind: ProposalKind::Standard,
            parent_id: None,
            revision_number: 1,
            active: true,
            tick,
            issue_id: issue_id.to_string(),
        }
    }

    /// Create the system NoAction proposal (always id 0).
    ///
    /// # Example
    ///
    /// ```rust
    /// use roundtable_consensus_core_rs::models::{Proposal, ProposalKind};
    ///
    /// let p = Proposal::no_action("Issue_1", 1);
    /// assert_eq!(p.proposal_id, 0);
    /// assert_eq!(p.kind, ProposalKind::NoAction);
    /// ```
    pub fn no_action(issue_id: &str, tick: usize) -> Self {
        Self {
            proposal_id: 0,
            content: "Take no action.".to_string(),
            author: "system".to_string(),
            author_type: AuthorKind::System,
            kind: ProposalKind::NoAction,
            parent_id: None,
            revision_number: 1,
            active: true,
            tick,
            issue_id: issue_id.to_string(),
        }
    }

    /// Create the successor version of this proposal.
    ///
    /// The child inherits author, author type and kind, points back at this
    /// version via `parent_id`, and increments the revision number. The
    /// caller is responsible for deactivating the parent.
    pub fn revised(&self, new_id: u64, new_content: String, tick: usize) -> Self {
        Self {
            proposal_id: new_id,
            content: new_content,
            author: self.author.clone(),
            author_type: self.author_type,
            kind: self.kind,
            parent_id: Some(self.proposal_id),
            revision_number: self.revision_number + 1,
            active: true,
            tick,
            issue_id: self.issue_id.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_proposal_defaults() {
        let p = Proposal::standard(7, "Do the thing.".to_string(), "A", "I1", 2);
        assert_eq!(p.author, "A");
        assert_eq!(p.author_type, AuthorKind::Agent);
        assert_eq!(p.kind, ProposalKind::Standard);
        assert_eq!(p.parent_id, None);
        assert_eq!(p.revision_number, 1);
        assert!(p.active);
    }

    #[test]
    fn test_no_action_is_system_authored() {
        let p = Proposal::no_action("I1", 1);
        assert_eq!(p.author, "system");
        assert_eq!(p.author_type, AuthorKind::System);
        assert_eq!(p.proposal_id, 0);
    }

    #[test]
    fn test_revised_links_lineage() {
        let p = Proposal::standard(3, "Old text.".to_string(), "A", "I1", 2);
        let child = p.revised(9, "New text.".to_string(), 8);

        assert_eq!(child.proposal_id, 9);
        assert_eq!(child.parent_id, Some(3));
        assert_eq!(child.revision_number, 2);
        assert_eq!(child.author, "A");
        assert_eq!(child.kind, ProposalKind::Standard);
        assert!(child.active);
    }
}
