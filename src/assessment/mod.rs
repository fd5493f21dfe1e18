//! Assessment Modal
//!
//! When an existing assessment is opened for editing, the modal fetches the
//! objects mapped to it. Those arrive as snapshots (frozen revisions of the
//! original objects), which are flattened into display rows.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::error::Result;
use crate::notifier::PendingOperationQueue;
use crate::request::Request;

/// Reference to the assessment being edited
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssessmentRef {
    pub id: u64,
    pub title: String,
}

/// Frozen revision of an object mapped to the assessment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub id: u64,
    /// Type of the original object, e.g. `"Control"`
    pub child_type: String,
    /// Id of the original object
    pub child_id: u64,
    /// Serialized object content at snapshot time
    #[serde(default)]
    pub content: Value,
}

/// Objects related to an assessment, grouped by kind
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelatedObjects {
    #[serde(rename = "Snapshot")]
    pub snapshots: Vec<Snapshot>,
}

/// Display fields recovered from a snapshot
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotObject {
    pub class: String,
    pub title: String,
    pub description: String,
    pub original_link: String,
}

/// Snapshot plus the fields the mapped-objects list renders
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MappedSnapshot {
    pub snapshot: Snapshot,
    pub class: String,
    pub title: String,
    pub description: String,
    pub view_link: String,
}

impl MappedSnapshot {
    fn new(snapshot: Snapshot, object: SnapshotObject) -> Self {
        Self {
            snapshot,
            class: object.class,
            title: object.title,
            description: object.description,
            view_link: object.original_link,
        }
    }
}

/// Backend call listing the objects related to an assessment
pub trait RelatedObjectsSource {
    fn related_objects(&self, assessment: &AssessmentRef) -> Request<RelatedObjects>;
}

/// Turns a snapshot back into the object it froze
pub trait SnapshotMapper {
    fn to_object(&self, snapshot: &Snapshot) -> SnapshotObject;
}

/// Reads `title`/`description` from the snapshot content and links to the
/// live object at `/<type>s/<id>`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ContentMapper;

impl SnapshotMapper for ContentMapper {
    fn to_object(&self, snapshot: &Snapshot) -> SnapshotObject {
        let text = |key: &str| {
            snapshot
                .content
                .get(key)
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string()
        };
        SnapshotObject {
            class: snapshot.child_type.clone(),
            title: text("title"),
            description: text("description"),
            original_link: format!(
                "/{}s/{}",
                snapshot.child_type.to_lowercase(),
                snapshot.child_id
            ),
        }
    }
}

/// View model of the assessment modal
pub struct AssessmentModal {
    instance: AssessmentRef,
    is_new_instance: bool,
    mapped_objects: Rc<RefCell<Vec<MappedSnapshot>>>,
    source: Rc<dyn RelatedObjectsSource>,
    mapper: Rc<dyn SnapshotMapper>,
    pending: Option<PendingOperationQueue>,
}

impl AssessmentModal {
    pub fn new(instance: AssessmentRef, source: Rc<dyn RelatedObjectsSource>) -> Self {
        Self {
            instance,
            is_new_instance: false,
            mapped_objects: Rc::new(RefCell::new(Vec::new())),
            source,
            mapper: Rc::new(ContentMapper),
            pending: None,
        }
    }

    /// Mark the assessment as being created; nothing is loaded then
    pub fn new_instance(mut self, is_new: bool) -> Self {
        self.is_new_instance = is_new;
        self
    }

    pub fn with_mapper(mut self, mapper: Rc<dyn SnapshotMapper>) -> Self {
        self.mapper = mapper;
        self
    }

    /// Track loads on the modal's pending-operation queue
    pub fn with_pending_queue(mut self, queue: PendingOperationQueue) -> Self {
        self.pending = Some(queue);
        self
    }

    pub fn instance(&self) -> &AssessmentRef {
        &self.instance
    }

    pub fn is_new_instance(&self) -> bool {
        self.is_new_instance
    }

    /// Rows loaded so far
    pub fn mapped_objects(&self) -> Vec<MappedSnapshot> {
        self.mapped_objects.borrow().clone()
    }

    /// Fetch related objects and replace the mapped rows.
    ///
    /// The returned request resolves with the number of rows once they are
    /// stored.
    pub fn load_data(&self) -> Result<Request<usize>> {
        debug!(assessment = self.instance.id, "loading related objects");
        let (rows, mapper) = (self.mapped_objects.clone(), self.mapper.clone());
        let loaded = self
            .source
            .related_objects(&self.instance)
            .then(move |related| {
                let mapped: Vec<_> = related
                    .snapshots
                    .iter()
                    .map(|snapshot| MappedSnapshot::new(snapshot.clone(), mapper.to_object(snapshot)))
                    .collect();
                let count = mapped.len();
                *rows.borrow_mut() = mapped;
                count
            });
        if let Some(queue) = &self.pending {
            queue.enqueue(&loaded)?;
        }
        Ok(loaded)
    }

    /// Lifecycle hook run when the modal is attached to the page
    pub fn inserted(&self) -> Result<Option<Request<usize>>> {
        if self.is_new_instance {
            return Ok(None);
        }
        self.load_data().map(Some)
    }
}

impl fmt::Debug for AssessmentModal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AssessmentModal")
            .field("instance", &self.instance)
            .field("is_new_instance", &self.is_new_instance)
            .field("mapped_objects", &self.mapped_objects.borrow().len())
            .finish_non_exhaustive()
    }
}
