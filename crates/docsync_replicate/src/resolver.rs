//! Conflict policy and the decision table.
//!
//! Each directional pass looks at three fingerprints for an id: the pass
//! source, the pass destination, and the last agreed one (the status).
//! `None` means "absent on that side" (or "never agreed" for the status).
//! [`resolve`] turns them into one [`Action`]; it never touches a storage.

use crate::signature::Origin;
use serde::{Deserialize, Serialize};
use std::fmt;

/// How divergent changes on both sides are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum ConflictHandling {
    /// Fail the id with a conflict error.
    #[default]
    Raise,
    /// The local side wins.
    KeepLocal,
    /// The remote side wins.
    KeepRemote,
    /// Keep both sides as they are and retry on the next cycle.
    Continue,
}

impl ConflictHandling {
    /// Converts to the numeric configuration code.
    pub fn to_code(self) -> u8 {
        match self {
            ConflictHandling::Raise => 0,
            ConflictHandling::KeepLocal => 1,
            ConflictHandling::KeepRemote => 2,
            ConflictHandling::Continue => 3,
        }
    }

    /// Parses a numeric configuration code.
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0 => Some(ConflictHandling::Raise),
            1 => Some(ConflictHandling::KeepLocal),
            2 => Some(ConflictHandling::KeepRemote),
            3 => Some(ConflictHandling::Continue),
            _ => None,
        }
    }
}

impl TryFrom<u8> for ConflictHandling {
    type Error = String;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        Self::from_code(code).ok_or_else(|| format!("unsupported conflict_handling {code}"))
    }
}

impl From<ConflictHandling> for u8 {
    fn from(handling: ConflictHandling) -> u8 {
        handling.to_code()
    }
}

/// Direction of a document or attachment pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    /// Local is the source, remote the destination.
    LocalToRemote,
    /// Remote is the source, local the destination.
    RemoteToLocal,
}

impl Direction {
    /// Side read first in this pass.
    pub fn source(self) -> Origin {
        match self {
            Direction::LocalToRemote => Origin::Local,
            Direction::RemoteToLocal => Origin::Remote,
        }
    }

    /// Side written to when the source wins.
    pub fn destination(self) -> Origin {
        self.source().opposite()
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::LocalToRemote => f.write_str("local->remote"),
            Direction::RemoteToLocal => f.write_str("remote->local"),
        }
    }
}

/// A conflict policy seen from one pass direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bias {
    /// The source always wins.
    pub force: bool,
    /// The destination always wins.
    pub revert: bool,
    /// Divergence is left alone.
    pub ignore: bool,
}

impl Bias {
    /// Derives the bias of `handling` for a pass in `direction`.
    pub fn new(handling: ConflictHandling, direction: Direction) -> Self {
        let (source_wins, destination_wins) = match direction {
            Direction::LocalToRemote => (ConflictHandling::KeepLocal, ConflictHandling::KeepRemote),
            Direction::RemoteToLocal => (ConflictHandling::KeepRemote, ConflictHandling::KeepLocal),
        };
        Self {
            force: handling == source_wins,
            revert: handling == destination_wins,
            ignore: handling == ConflictHandling::Continue,
        }
    }
}

/// What a pass does for one id (or one attachment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Both sides agree; only the signature is brought up to date.
    NoOp,
    /// Copy the source content onto the destination.
    PropagateToDestination,
    /// The source deleted it; delete it on the destination.
    DeleteOnDestination,
    /// Divergence is left for a later cycle.
    Ignore,
    /// Copy the destination content back onto the source.
    PropagateToSource,
    /// The destination deleted it; delete it on the source.
    DeleteOnSource,
    /// Both sides changed independently and nothing settles it.
    RaiseConflict,
}

impl Action {
    /// Action name as used in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::NoOp => "noop",
            Action::PropagateToDestination => "propagate_to_destination",
            Action::DeleteOnDestination => "delete_on_destination",
            Action::Ignore => "ignore",
            Action::PropagateToSource => "propagate_to_source",
            Action::DeleteOnSource => "delete_on_source",
            Action::RaiseConflict => "raise_conflict",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Decides what to do with one id. Branches are evaluated in order.
///
/// 1. Both sides agree: nothing to copy.
/// 2. The destination did not move since the last agreement, or the source
///    is forced: the source wins (absent source means delete).
/// 3. Divergence under the ignore policy is left alone.
/// 4. Reverted, or the source is the one that is absent: the destination
///    wins (absent destination means delete).
/// 5. The destination deleted what the source edited: recreate it from
///    the source so the edit is not lost.
/// 6. Anything else is a conflict.
///
/// Branch 5 has no mirror: a source deletion against a destination edit is
/// already settled by branch 4 in favour of the edit.
pub fn resolve(
    source: Option<&str>,
    destination: Option<&str>,
    status: Option<&str>,
    bias: Bias,
) -> Action {
    if source == destination {
        return Action::NoOp;
    }
    if destination == status || bias.force {
        return match source {
            None => Action::DeleteOnDestination,
            Some(_) => Action::PropagateToDestination,
        };
    }
    if bias.ignore {
        return Action::Ignore;
    }
    if bias.revert || source.is_none() {
        return match destination {
            None => Action::DeleteOnSource,
            Some(_) => Action::PropagateToSource,
        };
    }
    if destination.is_none() {
        return Action::PropagateToDestination;
    }
    Action::RaiseConflict
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RAISE: Bias = Bias {
        force: false,
        revert: false,
        ignore: false,
    };

    fn bias(handling: ConflictHandling) -> Bias {
        Bias::new(handling, Direction::LocalToRemote)
    }

    #[test]
    fn conflict_handling_codes() {
        for code in 0..=3u8 {
            let handling = ConflictHandling::from_code(code).unwrap();
            assert_eq!(handling.to_code(), code);
        }
        assert!(ConflictHandling::from_code(4).is_none());
        assert!(ConflictHandling::try_from(9u8).is_err());
    }

    #[test]
    fn conflict_handling_serde() {
        let handling: ConflictHandling = serde_json::from_str("2").unwrap();
        assert_eq!(handling, ConflictHandling::KeepRemote);
        assert_eq!(serde_json::to_string(&ConflictHandling::Continue).unwrap(), "3");
        assert!(serde_json::from_str::<ConflictHandling>("7").is_err());
    }

    #[test]
    fn bias_swaps_with_direction() {
        let forward = Bias::new(ConflictHandling::KeepLocal, Direction::LocalToRemote);
        let backward = Bias::new(ConflictHandling::KeepLocal, Direction::RemoteToLocal);
        assert!(forward.force && !forward.revert);
        assert!(backward.revert && !backward.force);

        let ignore = Bias::new(ConflictHandling::Continue, Direction::RemoteToLocal);
        assert!(ignore.ignore && !ignore.force && !ignore.revert);
        assert_eq!(
            Bias::new(ConflictHandling::Raise, Direction::RemoteToLocal),
            RAISE
        );
    }

    #[test]
    fn direction_sides() {
        assert_eq!(Direction::LocalToRemote.source(), Origin::Local);
        assert_eq!(Direction::LocalToRemote.destination(), Origin::Remote);
        assert_eq!(Direction::RemoteToLocal.source(), Origin::Remote);
    }

    #[test]
    fn agreement_is_noop() {
        assert_eq!(resolve(Some("a"), Some("a"), Some("x"), RAISE), Action::NoOp);
        assert_eq!(resolve(None, None, Some("x"), RAISE), Action::NoOp);
    }

    #[test]
    fn unchanged_destination_follows_source() {
        assert_eq!(
            resolve(Some("b"), Some("a"), Some("a"), RAISE),
            Action::PropagateToDestination
        );
        assert_eq!(
            resolve(None, Some("a"), Some("a"), RAISE),
            Action::DeleteOnDestination
        );
        // First time seen on the source only.
        assert_eq!(
            resolve(Some("b"), None, None, RAISE),
            Action::PropagateToDestination
        );
    }

    #[test]
    fn force_overrides_divergence() {
        let force = bias(ConflictHandling::KeepLocal);
        assert_eq!(
            resolve(Some("b"), Some("c"), Some("a"), force),
            Action::PropagateToDestination
        );
        assert_eq!(
            resolve(None, Some("c"), Some("a"), force),
            Action::DeleteOnDestination
        );
    }

    #[test]
    fn ignore_leaves_divergence() {
        let ignore = bias(ConflictHandling::Continue);
        assert_eq!(resolve(Some("b"), Some("c"), Some("a"), ignore), Action::Ignore);
        assert_eq!(resolve(None, Some("c"), Some("a"), ignore), Action::Ignore);
        // No divergence, no ignore.
        assert_eq!(
            resolve(Some("b"), Some("a"), Some("a"), ignore),
            Action::PropagateToDestination
        );
    }

    #[test]
    fn revert_and_absent_source_follow_destination() {
        let revert = bias(ConflictHandling::KeepRemote);
        assert_eq!(
            resolve(Some("b"), Some("c"), Some("a"), revert),
            Action::PropagateToSource
        );
        assert_eq!(
            resolve(Some("b"), None, Some("a"), revert),
            Action::DeleteOnSource
        );
        // Source deleted, destination edited: the edit survives.
        assert_eq!(
            resolve(None, Some("c"), Some("a"), RAISE),
            Action::PropagateToSource
        );
    }

    #[test]
    fn destination_deletion_against_source_edit_recreates() {
        assert_eq!(
            resolve(Some("b"), None, Some("a"), RAISE),
            Action::PropagateToDestination
        );
    }

    #[test]
    fn double_edit_conflicts() {
        assert_eq!(
            resolve(Some("b"), Some("c"), Some("a"), RAISE),
            Action::RaiseConflict
        );
        // Two independent creations with different content.
        assert_eq!(
            resolve(Some("b"), Some("c"), None, RAISE),
            Action::RaiseConflict
        );
    }

    fn hash() -> impl Strategy<Value = Option<String>> {
        prop::option::of(prop_oneof![Just("a"), Just("b"), Just("c")].prop_map(String::from))
    }

    fn handling() -> impl Strategy<Value = ConflictHandling> {
        (0u8..=3).prop_map(|code| ConflictHandling::from_code(code).unwrap())
    }

    fn direction() -> impl Strategy<Value = Direction> {
        prop_oneof![Just(Direction::LocalToRemote), Just(Direction::RemoteToLocal)]
    }

    proptest! {
        #[test]
        fn resolution_is_pure(
            source in hash(),
            destination in hash(),
            status in hash(),
            handling in handling(),
            direction in direction(),
        ) {
            let bias = Bias::new(handling, direction);
            let first = resolve(source.as_deref(), destination.as_deref(), status.as_deref(), bias);
            // Unrelated calls in between do not influence the outcome.
            let _ = resolve(destination.as_deref(), source.as_deref(), None, Bias::default());
            let second = resolve(source.as_deref(), destination.as_deref(), status.as_deref(), bias);
            prop_assert_eq!(first, second);
        }

        #[test]
        fn only_raise_can_conflict(
            source in hash(),
            destination in hash(),
            status in hash(),
            handling in handling(),
            direction in direction(),
        ) {
            let action = resolve(
                source.as_deref(),
                destination.as_deref(),
                status.as_deref(),
                Bias::new(handling, direction),
            );
            if action == Action::RaiseConflict {
                prop_assert_eq!(handling, ConflictHandling::Raise);
                prop_assert!(source.is_some() && destination.is_some());
                prop_assert!(source != destination && destination != status);
            }
        }

        #[test]
        fn actions_never_copy_absent_content(
            source in hash(),
            destination in hash(),
            status in hash(),
            handling in handling(),
            direction in direction(),
        ) {
            let action = resolve(
                source.as_deref(),
                destination.as_deref(),
                status.as_deref(),
                Bias::new(handling, direction),
            );
            match action {
                Action::PropagateToDestination => prop_assert!(source.is_some()),
                Action::PropagateToSource => prop_assert!(destination.is_some()),
                Action::DeleteOnDestination => prop_assert!(source.is_none() && destination.is_some()),
                Action::DeleteOnSource => prop_assert!(destination.is_none() && source.is_some()),
                _ => {}
            }
        }
    }
}
