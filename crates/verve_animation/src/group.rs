//! Group completion tracking
//!
//! Every `animate` block opens a group. Machines started or retargeted inside
//! the block join it; the block's completion fires exactly once, after the
//! block body has returned (the group is *sealed*) and every member has either
//! finished or been retargeted into another block.

use crate::animation::AnimationId;
use crate::context;
use rustc_hash::FxHashSet;
use slotmap::{new_key_type, SlotMap};

new_key_type! {
    /// Handle to the completion record of one animation block
    pub struct GroupId;
}

/// Outcome reported to a block's completion callback
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GroupCompletion {
    /// Every member that finished in this block ended at its target
    pub finished: bool,
    /// At least one member was taken over by a later block
    pub retargeted: bool,
}

pub(crate) type GroupCallback = Box<dyn FnOnce(GroupCompletion)>;

struct GroupRecord {
    members: FxHashSet<AnimationId>,
    sealed: bool,
    retargeted: bool,
    interrupted: bool,
    completion: Option<GroupCallback>,
}

/// A group whose completion is due; fire it outside the context borrow
pub(crate) struct ReadyGroup {
    callback: Option<GroupCallback>,
    result: GroupCompletion,
}

impl ReadyGroup {
    pub(crate) fn fire(self) {
        tracing::trace!(
            "group complete (finished: {}, retargeted: {})",
            self.result.finished,
            self.result.retargeted
        );
        if let Some(callback) = self.callback {
            callback(self.result);
        }
    }
}

#[derive(Default)]
pub(crate) struct GroupTracker {
    groups: SlotMap<GroupId, GroupRecord>,
}

impl GroupTracker {
    pub(crate) fn open(&mut self, completion: Option<GroupCallback>) -> GroupId {
        self.groups.insert(GroupRecord {
            members: FxHashSet::default(),
            sealed: false,
            retargeted: false,
            interrupted: false,
            completion,
        })
    }

    pub(crate) fn join(&mut self, group: GroupId, member: AnimationId) {
        match self.groups.get_mut(group) {
            Some(record) => {
                record.members.insert(member);
            }
            None => tracing::trace!("{:?} joined completed group {:?}", member, group),
        }
    }

    /// The block body has returned; no new members can join
    pub(crate) fn seal(&mut self, group: GroupId) -> Option<ReadyGroup> {
        self.groups.get_mut(group)?.sealed = true;
        self.settle(group)
    }

    pub(crate) fn finish_member(
        &mut self,
        group: GroupId,
        member: AnimationId,
        reached_end: bool,
    ) -> Option<ReadyGroup> {
        let record = self.groups.get_mut(group)?;
        if !record.members.remove(&member) {
            return None;
        }
        record.interrupted |= !reached_end;
        self.settle(group)
    }

    pub(crate) fn retarget_member(
        &mut self,
        group: GroupId,
        member: AnimationId,
    ) -> Option<ReadyGroup> {
        let record = self.groups.get_mut(group)?;
        if !record.members.remove(&member) {
            return None;
        }
        record.retargeted = true;
        self.settle(group)
    }

    pub(crate) fn pending_members(&self, group: GroupId) -> Option<usize> {
        self.groups.get(group).map(|record| record.members.len())
    }

    fn settle(&mut self, group: GroupId) -> Option<ReadyGroup> {
        let record = self.groups.get(group)?;
        if !record.sealed || !record.members.is_empty() {
            return None;
        }
        let record = self.groups.remove(group)?;
        Some(ReadyGroup {
            callback: record.completion,
            result: GroupCompletion {
                finished: !record.interrupted,
                retargeted: record.retargeted,
            },
        })
    }
}

pub(crate) fn join(group: GroupId, member: AnimationId) {
    context::with_context(|cx| cx.groups.join(group, member));
}

pub(crate) fn member_finished(group: GroupId, member: AnimationId, reached_end: bool) {
    let ready = context::with_context(|cx| cx.groups.finish_member(group, member, reached_end));
    if let Some(ready) = ready {
        ready.fire();
    }
}

pub(crate) fn member_retargeted(group: GroupId, member: AnimationId) {
    let ready = context::with_context(|cx| cx.groups.retarget_member(group, member));
    if let Some(ready) = ready {
        ready.fire();
    }
}

/// Members of `group` still running, or `None` once its completion has fired
pub fn pending_members(group: GroupId) -> Option<usize> {
    context::with_context(|cx| cx.groups.pending_members(group))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn recorder() -> (Rc<RefCell<Vec<GroupCompletion>>>, GroupCallback) {
        let log = Rc::new(RefCell::new(Vec::new()));
        let sink = log.clone();
        (log, Box::new(move |result| sink.borrow_mut().push(result)))
    }

    #[test]
    fn test_empty_group_completes_on_seal() {
        let mut tracker = GroupTracker::default();
        let (log, callback) = recorder();
        let group = tracker.open(Some(callback));

        tracker.seal(group).unwrap().fire();
        assert_eq!(
            *log.borrow(),
            vec![GroupCompletion {
                finished: true,
                retargeted: false
            }]
        );
        assert!(tracker.groups.is_empty());
    }

    #[test]
    fn test_waits_for_every_member() {
        let mut tracker = GroupTracker::default();
        let (log, callback) = recorder();
        let group = tracker.open(Some(callback));
        tracker.join(group, AnimationId::from_raw(1));
        tracker.join(group, AnimationId::from_raw(2));

        assert!(tracker.seal(group).is_none());
        assert!(tracker
            .finish_member(group, AnimationId::from_raw(1), true)
            .is_none());
        assert_eq!(tracker.pending_members(group), Some(1));

        tracker
            .finish_member(group, AnimationId::from_raw(2), true)
            .unwrap()
            .fire();
        assert_eq!(log.borrow().len(), 1);
        assert!(log.borrow()[0].finished);
    }

    #[test]
    fn test_members_finishing_before_seal() {
        let mut tracker = GroupTracker::default();
        let group = tracker.open(None);
        tracker.join(group, AnimationId::from_raw(7));
        assert!(tracker
            .finish_member(group, AnimationId::from_raw(7), true)
            .is_none());
        assert!(tracker.seal(group).is_some());
    }

    #[test]
    fn test_retargeted_member_marks_group() {
        let mut tracker = GroupTracker::default();
        let (log, callback) = recorder();
        let group = tracker.open(Some(callback));
        tracker.join(group, AnimationId::from_raw(1));
        tracker.join(group, AnimationId::from_raw(2));
        tracker.seal(group);

        assert!(tracker
            .retarget_member(group, AnimationId::from_raw(1))
            .is_none());
        tracker
            .finish_member(group, AnimationId::from_raw(2), false)
            .unwrap()
            .fire();

        assert_eq!(
            *log.borrow(),
            vec![GroupCompletion {
                finished: false,
                retargeted: true
            }]
        );
    }

    #[test]
    fn test_unknown_member_is_ignored() {
        let mut tracker = GroupTracker::default();
        let group = tracker.open(None);
        tracker.join(group, AnimationId::from_raw(1));
        tracker.seal(group);
        assert!(tracker
            .finish_member(group, AnimationId::from_raw(99), true)
            .is_none());
        assert_eq!(tracker.pending_members(group), Some(1));
    }
}
