//! Comments Section
//!
//! Decides whether the comment form of an object page is usable. Comments
//! are blocked when the user may not update the object, when the object is
//! archived, or when the object is owned by an external system (comments
//! must then be added there instead).

use std::fmt;
use std::rc::Rc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};

/// Label of the "notify people" checkbox
pub const DEFAULT_NOTIFICATION_LABEL: &str = "Send Notifications";

/// Permission-checked actions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Action {
    Read,
    Update,
    Delete,
}

/// Object whose comments are shown
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentTarget {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: u64,
    #[serde(default)]
    pub archived: bool,
    /// Object is mastered by an external application
    #[serde(default)]
    pub changeable_externally: bool,
}

impl CommentTarget {
    pub fn new(kind: impl Into<String>, id: u64) -> Self {
        Self {
            kind: kind.into(),
            id,
            archived: false,
            changeable_externally: false,
        }
    }
}

/// Server-side permission model as seen by the page
pub trait PermissionChecker {
    fn is_allowed_for(&self, action: Action, target: &CommentTarget) -> bool;
}

/// Grants listed `(action, object type)` pairs and nothing else
#[derive(Debug, Clone, Default)]
pub struct AllowList {
    grants: FxHashSet<(Action, String)>,
}

impl AllowList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Grant `action` on every object of `kind`
    pub fn allow(mut self, action: Action, kind: impl Into<String>) -> Self {
        self.grants.insert((action, kind.into()));
        self
    }
}

impl PermissionChecker for AllowList {
    fn is_allowed_for(&self, action: Action, target: &CommentTarget) -> bool {
        self.grants.contains(&(action, target.kind.clone()))
    }
}

/// View model of the comments section
pub struct CommentsSection {
    instance: Option<CommentTarget>,
    notification: String,
    permissions: Rc<dyn PermissionChecker>,
}

impl CommentsSection {
    pub fn new(permissions: Rc<dyn PermissionChecker>) -> Self {
        Self {
            instance: None,
            notification: DEFAULT_NOTIFICATION_LABEL.to_string(),
            permissions,
        }
    }

    pub fn with_instance(mut self, instance: CommentTarget) -> Self {
        self.instance = Some(instance);
        self
    }

    pub fn instance(&self) -> Option<&CommentTarget> {
        self.instance.as_ref()
    }

    pub fn set_instance(&mut self, instance: Option<CommentTarget>) {
        self.instance = instance;
    }

    pub fn notification(&self) -> &str {
        &self.notification
    }

    pub fn set_notification(&mut self, label: impl Into<String>) {
        self.notification = label.into();
    }

    /// Whether the comment form must be disabled.
    ///
    /// Always true while no object is bound.
    pub fn is_denied_to_add_comment(&self) -> bool {
        match &self.instance {
            None => true,
            Some(instance) => {
                !self.permissions.is_allowed_for(Action::Update, instance)
                    || instance.archived
                    || instance.changeable_externally
            }
        }
    }

    /// Whether to point the user at the external system instead
    pub fn is_allowed_to_add_comment_externally(&self) -> bool {
        self.instance
            .as_ref()
            .is_some_and(|instance| instance.changeable_externally)
    }
}

impl fmt::Debug for CommentsSection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommentsSection")
            .field("instance", &self.instance)
            .field("notification", &self.notification)
            .finish_non_exhaustive()
    }
}
