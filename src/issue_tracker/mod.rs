//! Issue-Tracker Fields
//!
//! View model behind the "ticket tracker" section of object modals. The user
//! either links the object to an existing ticket or asks for a new one to be
//! generated; the section tracks which of those the wizard is in, which
//! fields are shown, and whether a typed-in ticket id has been validated by
//! the backend.
//!
//! # Example
//! ```
//! use std::rc::Rc;
//! use compliance_ui::deferred::Deferred;
//! use compliance_ui::issue_tracker::*;
//!
//! struct AlwaysValid;
//! impl TicketValidator for AlwaysValid {
//!     fn validate(&self, _issue_id: &str) -> compliance_ui::request::Request<TicketCheckResponse> {
//!         Deferred::resolved(TicketCheckResponse::valid())
//!     }
//! }
//!
//! let mut instance = TrackedInstance::new("Assessment", 1, "In Progress");
//! instance.issue_tracker.enabled = true;
//! let mut fields = IssueTrackerFields::new(instance, IssueTrackerConfig::default(), Rc::new(AlwaysValid));
//! fields.inserted();
//! fields.link_to_existing_ticket();
//! fields.instance_mut().issue_tracker.issue_id = Some("12345".into());
//! fields.check_ticket_id().unwrap();
//! assert!(fields.ticket_check().successful);
//! ```

mod config;

pub use config::IssueTrackerConfig;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::error::Result;
use crate::notifier::PendingOperationQueue;
use crate::request::{Request, RequestFailure};

/// Where the ticket-linking wizard currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketLinkState {
    /// Neither option chosen yet
    NotSelected,
    /// Object already has a ticket
    Linked,
    /// User is entering an existing ticket id
    LinkToExisting,
    /// A new ticket will be generated on save
    GenerateNew,
}

impl TicketLinkState {
    /// Label shown next to the wizard
    pub fn label(self) -> &'static str {
        match self {
            TicketLinkState::NotSelected => "Select an option",
            TicketLinkState::Linked => "Linked to ticket",
            TicketLinkState::LinkToExisting => "Link to existing ticket",
            TicketLinkState::GenerateNew => "Generate new ticket",
        }
    }
}

impl fmt::Display for TicketLinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Flags the modal's validators read to decide which fields are required
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationFlags {
    /// Linking to an existing ticket (ticket id required)
    pub linking: bool,
    /// The user made a choice, so validation applies
    pub initialized: bool,
}

/// Issue-tracker attributes of an object
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IssueTrackerInfo {
    pub enabled: bool,
    pub issue_id: Option<String>,
    pub hotlist_id: Option<String>,
    pub component_id: Option<String>,
    #[serde(skip)]
    pub validation: ValidationFlags,
}

/// Object being edited in the modal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackedInstance {
    #[serde(rename = "type")]
    pub kind: String,
    pub id: u64,
    pub status: String,
    #[serde(default)]
    pub issue_tracker: IssueTrackerInfo,
}

impl TrackedInstance {
    pub fn new(kind: impl Into<String>, id: u64, status: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            id,
            status: status.into(),
            issue_tracker: IssueTrackerInfo::default(),
        }
    }

    /// Whether a ticket is already attached
    pub fn issue_created(&self) -> bool {
        self.issue_tracker.enabled
            && self
                .issue_tracker
                .issue_id
                .as_deref()
                .is_some_and(|id| !id.is_empty())
    }

    /// Fill hotlist and component from the page defaults
    pub fn set_default_hotlist_and_component(&mut self, config: &IssueTrackerConfig) {
        self.issue_tracker.hotlist_id = config.default_hotlist_id.clone();
        self.issue_tracker.component_id = config.default_component_id.clone();
    }
}

/// Backend answer to "may this object use ticket `issue_id`?"
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TicketCheckResponse {
    pub valid: bool,
    pub msg: String,
    /// Type of the object the ticket is already linked to, if any
    #[serde(rename = "type")]
    pub kind: Option<String>,
    /// Id of the object the ticket is already linked to, if any
    pub id: Option<u64>,
}

impl TicketCheckResponse {
    /// Response for an unlinked, usable ticket
    pub fn valid() -> Self {
        Self {
            valid: true,
            ..Self::default()
        }
    }

    /// Response rejecting the ticket with `msg`
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self {
            msg: msg.into(),
            ..Self::default()
        }
    }

    /// Mark the ticket as already linked to `kind`/`id`
    pub fn linked_to(mut self, kind: impl Into<String>, id: u64) -> Self {
        self.kind = Some(kind.into());
        self.id = Some(id);
        self
    }

    fn is_linked_to(&self, instance: &TrackedInstance) -> bool {
        self.kind.as_deref() == Some(instance.kind.as_str()) && self.id == Some(instance.id)
    }
}

/// Progress of the ticket-id validation round trip
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TicketIdCheck {
    pub checking: bool,
    pub checked: bool,
    pub successful: bool,
    pub message: String,
}

/// Backend endpoint validating ticket ids
pub trait TicketValidator {
    fn validate(&self, issue_id: &str) -> Request<TicketCheckResponse>;
}

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// Toast/flash surface of the page
pub trait UserNotifier {
    fn notify(&self, level: NoticeLevel, message: &str);
}

/// Notifier that only writes to the log
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl UserNotifier for LogNotifier {
    fn notify(&self, level: NoticeLevel, message: &str) {
        match level {
            NoticeLevel::Info => info!(text = message, "user notice"),
            NoticeLevel::Warning => warn!(text = message, "user notice"),
            NoticeLevel::Error => error!(text = message, "user notice"),
        }
    }
}

/// View model of the issue-tracker section of a modal
pub struct IssueTrackerFields {
    instance: TrackedInstance,
    config: IssueTrackerConfig,
    current_state: TicketLinkState,
    is_ticket_id_mandatory: bool,
    check: Rc<RefCell<TicketIdCheck>>,
    validator: Rc<dyn TicketValidator>,
    notifier: Rc<dyn UserNotifier>,
    pending: Option<PendingOperationQueue>,
}

impl IssueTrackerFields {
    pub fn new(
        instance: TrackedInstance,
        config: IssueTrackerConfig,
        validator: Rc<dyn TicketValidator>,
    ) -> Self {
        Self {
            instance,
            config,
            current_state: TicketLinkState::NotSelected,
            is_ticket_id_mandatory: false,
            check: Rc::new(RefCell::new(TicketIdCheck::default())),
            validator,
            notifier: Rc::new(LogNotifier),
            pending: None,
        }
    }

    /// Report request failures through `notifier` instead of the log
    pub fn with_notifier(mut self, notifier: Rc<dyn UserNotifier>) -> Self {
        self.notifier = notifier;
        self
    }

    /// Track validation requests on the modal's pending-operation queue
    pub fn with_pending_queue(mut self, queue: PendingOperationQueue) -> Self {
        self.pending = Some(queue);
        self
    }

    pub fn instance(&self) -> &TrackedInstance {
        &self.instance
    }

    pub fn instance_mut(&mut self) -> &mut TrackedInstance {
        &mut self.instance
    }

    pub fn current_state(&self) -> TicketLinkState {
        self.current_state
    }

    pub fn set_current_state(&mut self, state: TicketLinkState) {
        self.current_state = state;
    }

    pub fn is_ticket_id_mandatory(&self) -> bool {
        self.is_ticket_id_mandatory
    }

    /// Snapshot of the ticket-id validation flags
    pub fn ticket_check(&self) -> TicketIdCheck {
        self.check.borrow().clone()
    }

    /// Whether the tracker fields are shown at all
    pub fn display_fields(&self) -> bool {
        self.instance.issue_tracker.enabled && self.current_state != TicketLinkState::NotSelected
    }

    /// Lifecycle hook run when the section is attached to the page
    pub fn inserted(&mut self) {
        self.set_ticket_id_mandatory();
        if self.instance.issue_created() {
            self.current_state = TicketLinkState::Linked;
            self.set_validation_flags(ValidationFlags {
                initialized: true,
                linking: false,
            });
        } else {
            self.set_validation_flags(ValidationFlags {
                initialized: false,
                linking: false,
            });
        }
    }

    /// Switch to "generate new ticket"
    pub fn generate_new_ticket(&mut self) {
        if self.current_state == TicketLinkState::GenerateNew {
            return;
        }
        self.transition(TicketLinkState::GenerateNew);
        self.set_validation_flags(ValidationFlags {
            linking: false,
            initialized: true,
        });
        self.instance.set_default_hotlist_and_component(&self.config);
        self.instance.issue_tracker.issue_id = None;
    }

    /// Switch to "link to existing ticket"
    pub fn link_to_existing_ticket(&mut self) {
        if self.current_state == TicketLinkState::LinkToExisting {
            return;
        }
        self.transition(TicketLinkState::LinkToExisting);
        self.set_validation_flags(ValidationFlags {
            linking: true,
            initialized: true,
        });
        self.instance.issue_tracker.hotlist_id = None;
        self.instance.issue_tracker.component_id = None;
    }

    /// Recompute whether the current status requires a ticket id
    pub fn set_ticket_id_mandatory(&mut self) {
        self.is_ticket_id_mandatory = self.config.is_issue_id_locked(&self.instance.status);
    }

    /// React to the object's status being changed in the modal.
    ///
    /// Generating a new ticket is not possible once a ticket id is
    /// mandatory, so the wizard falls back to linking.
    pub fn status_changed(&mut self, status: impl Into<String>) {
        self.instance.status = status.into();
        self.set_ticket_id_mandatory();
        if self.current_state == TicketLinkState::GenerateNew && self.is_ticket_id_mandatory {
            self.link_to_existing_ticket();
        }
    }

    /// Ask the backend whether the entered ticket id may be used.
    ///
    /// Returns `Ok(None)` without a request when no ticket id is entered or
    /// a check is already running.
    pub fn check_ticket_id(&self) -> Result<Option<Request<TicketCheckResponse>>> {
        let Some(issue_id) = self
            .instance
            .issue_tracker
            .issue_id
            .as_deref()
            .filter(|id| !id.is_empty())
        else {
            return Ok(None);
        };
        if self.check.borrow().checking {
            return Ok(None);
        }

        *self.check.borrow_mut() = TicketIdCheck {
            checking: true,
            ..TicketIdCheck::default()
        };
        debug!(issue_id, "checking ticket id");

        let request = self.validator.validate(issue_id);

        let (check, instance) = (self.check.clone(), self.instance.clone());
        request.done(move |response| {
            let successful = response.valid || response.is_linked_to(&instance);
            *check.borrow_mut() = TicketIdCheck {
                checking: false,
                checked: true,
                successful,
                message: if successful {
                    String::new()
                } else {
                    response.msg.clone()
                },
            };
        });

        let (check, notifier) = (self.check.clone(), self.notifier.clone());
        request.fail(move |failure: &RequestFailure| {
            *check.borrow_mut() = TicketIdCheck::default();
            notifier.notify(NoticeLevel::Error, &failure.details);
        });

        if let Some(queue) = &self.pending {
            if let Err(err) = queue.enqueue(&request) {
                *self.check.borrow_mut() = TicketIdCheck::default();
                return Err(err);
            }
        }
        Ok(Some(request))
    }

    fn set_validation_flags(&mut self, flags: ValidationFlags) {
        self.instance.issue_tracker.validation = flags;
    }

    fn transition(&mut self, next: TicketLinkState) {
        debug!(from = %self.current_state, to = %next, "ticket link state");
        self.current_state = next;
    }
}

impl fmt::Debug for IssueTrackerFields {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IssueTrackerFields")
            .field("instance", &self.instance)
            .field("current_state", &self.current_state)
            .field("is_ticket_id_mandatory", &self.is_ticket_id_mandatory)
            .field("check", &*self.check.borrow())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::deferred::Deferred;
    use crate::event_loop::EventLoop;

    /// Validator returning a scripted response, counting calls
    struct Scripted {
        reply: RefCell<Option<Request<TicketCheckResponse>>>,
        calls: RefCell<Vec<String>>,
    }

    impl Scripted {
        fn new(reply: Request<TicketCheckResponse>) -> Rc<Self> {
            Rc::new(Self {
                reply: RefCell::new(Some(reply)),
                calls: RefCell::new(Vec::new()),
            })
        }
    }

    impl TicketValidator for Scripted {
        fn validate(&self, issue_id: &str) -> Request<TicketCheckResponse> {
            self.calls.borrow_mut().push(issue_id.to_string());
            self.reply.borrow_mut().take().unwrap_or_default()
        }
    }

    #[derive(Default)]
    struct Notices(RefCell<Vec<(NoticeLevel, String)>>);

    impl UserNotifier for Notices {
        fn notify(&self, level: NoticeLevel, message: &str) {
            self.0.borrow_mut().push((level, message.to_string()));
        }
    }

    fn fields_with(reply: Request<TicketCheckResponse>) -> (IssueTrackerFields, Rc<Scripted>) {
        let validator = Scripted::new(reply);
        let mut instance = TrackedInstance::new("Assessment", 1, "In Progress");
        instance.issue_tracker.enabled = true;
        let config = IssueTrackerConfig {
            unchangeable_issue_id_statuses: vec!["Fixed".to_string()],
            default_hotlist_id: Some("hotlist".to_string()),
            default_component_id: Some("component".to_string()),
        };
        (IssueTrackerFields::new(instance, config, validator.clone()), validator)
    }

    fn fields() -> IssueTrackerFields {
        fields_with(Deferred::new()).0
    }

    #[test]
    fn test_display_fields() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::Linked);
        assert!(vm.display_fields());

        vm.set_current_state(TicketLinkState::NotSelected);
        assert!(!vm.display_fields());

        vm.set_current_state(TicketLinkState::Linked);
        vm.instance_mut().issue_tracker.enabled = false;
        assert!(!vm.display_fields());
    }

    #[test]
    fn test_generate_new_ticket() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::LinkToExisting);
        vm.instance_mut().issue_tracker.issue_id = Some("issue id".to_string());

        vm.generate_new_ticket();

        let tracker = &vm.instance().issue_tracker;
        assert_eq!(vm.current_state(), TicketLinkState::GenerateNew);
        assert_eq!(tracker.validation, ValidationFlags { linking: false, initialized: true });
        assert_eq!(tracker.hotlist_id.as_deref(), Some("hotlist"));
        assert_eq!(tracker.component_id.as_deref(), Some("component"));
        assert_eq!(tracker.issue_id, None);
    }

    #[test]
    fn test_generate_new_ticket_noop_when_already_generating() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::GenerateNew);
        vm.instance_mut().issue_tracker.issue_id = Some("kept".to_string());

        vm.generate_new_ticket();

        let tracker = &vm.instance().issue_tracker;
        assert_eq!(tracker.validation, ValidationFlags::default());
        assert_eq!(tracker.hotlist_id, None);
        assert_eq!(tracker.issue_id.as_deref(), Some("kept"));
    }

    #[test]
    fn test_link_to_existing_ticket() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::GenerateNew);
        vm.instance_mut().issue_tracker.hotlist_id = Some("hotlist id".to_string());
        vm.instance_mut().issue_tracker.component_id = Some("component id".to_string());

        vm.link_to_existing_ticket();

        let tracker = &vm.instance().issue_tracker;
        assert_eq!(vm.current_state(), TicketLinkState::LinkToExisting);
        assert_eq!(tracker.validation, ValidationFlags { linking: true, initialized: true });
        assert_eq!(tracker.hotlist_id, None);
        assert_eq!(tracker.component_id, None);
    }

    #[test]
    fn test_link_to_existing_noop_when_already_linking() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::LinkToExisting);
        vm.link_to_existing_ticket();
        assert_eq!(vm.instance().issue_tracker.validation, ValidationFlags::default());
    }

    #[test]
    fn test_set_ticket_id_mandatory() {
        let mut vm = fields();
        vm.instance_mut().status = "Status".to_string();
        vm.set_ticket_id_mandatory();
        assert!(!vm.is_ticket_id_mandatory());

        vm.instance_mut().status = "Fixed".to_string();
        vm.set_ticket_id_mandatory();
        assert!(vm.is_ticket_id_mandatory());
    }

    #[test]
    fn test_status_changed_keeps_generate_new_when_optional() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::GenerateNew);
        vm.status_changed("In Review");
        assert_eq!(vm.current_state(), TicketLinkState::GenerateNew);
    }

    #[test]
    fn test_status_changed_falls_back_to_linking() {
        let mut vm = fields();
        vm.set_current_state(TicketLinkState::GenerateNew);
        vm.status_changed("Fixed");
        assert!(vm.is_ticket_id_mandatory());
        assert_eq!(vm.current_state(), TicketLinkState::LinkToExisting);
    }

    #[test]
    fn test_inserted_with_existing_issue() {
        let mut vm = fields();
        vm.instance_mut().issue_tracker.issue_id = Some("123".to_string());
        vm.inserted();
        assert_eq!(vm.current_state(), TicketLinkState::Linked);
        assert_eq!(
            vm.instance().issue_tracker.validation,
            ValidationFlags { initialized: true, linking: false }
        );
    }

    #[test]
    fn test_inserted_without_issue() {
        let mut vm = fields();
        vm.instance_mut().status = "Fixed".to_string();
        vm.inserted();
        assert!(vm.is_ticket_id_mandatory());
        assert_eq!(vm.current_state(), TicketLinkState::NotSelected);
        assert_eq!(vm.instance().issue_tracker.validation, ValidationFlags::default());
    }

    #[test]
    fn test_check_skipped_without_issue_id() {
        let (vm, validator) = fields_with(Deferred::new());
        assert!(vm.check_ticket_id().unwrap().is_none());
        assert!(validator.calls.borrow().is_empty());
    }

    #[test]
    fn test_check_skipped_while_checking() {
        let (mut vm, validator) = fields_with(Deferred::new());
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());

        assert!(vm.check_ticket_id().unwrap().is_some());
        assert!(vm.check_ticket_id().unwrap().is_none());
        assert_eq!(*validator.calls.borrow(), vec!["55".to_string()]);
    }

    #[test]
    fn test_check_sets_flags_before_response() {
        let (mut vm, _) = fields_with(Deferred::new());
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());
        vm.check_ticket_id().unwrap();
        assert_eq!(
            vm.ticket_check(),
            TicketIdCheck { checking: true, checked: false, successful: false, message: String::new() }
        );
    }

    #[test]
    fn test_check_invalid_response() {
        let reply = Deferred::resolved(TicketCheckResponse::invalid("invalid").linked_to("Assessment", 3));
        let (mut vm, _) = fields_with(reply);
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());
        vm.check_ticket_id().unwrap();
        assert_eq!(
            vm.ticket_check(),
            TicketIdCheck { checking: false, checked: true, successful: false, message: "invalid".to_string() }
        );
    }

    #[test]
    fn test_check_ticket_linked_to_same_object_is_successful() {
        let reply = Deferred::resolved(TicketCheckResponse::invalid("invalid").linked_to("Assessment", 1));
        let (mut vm, _) = fields_with(reply);
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());
        vm.check_ticket_id().unwrap();
        assert_eq!(
            vm.ticket_check(),
            TicketIdCheck { checking: false, checked: true, successful: true, message: String::new() }
        );
    }

    #[test]
    fn test_check_failure_notifies() {
        let (vm, _) = fields_with(Deferred::rejected(RequestFailure::new(500, "err")));
        let notices = Rc::new(Notices::default());
        let mut vm = vm.with_notifier(notices.clone());
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());

        vm.check_ticket_id().unwrap();

        assert_eq!(vm.ticket_check(), TicketIdCheck::default());
        assert_eq!(*notices.0.borrow(), vec![(NoticeLevel::Error, "err".to_string())]);
    }

    #[test]
    fn test_check_tracked_on_pending_queue() {
        let el = EventLoop::new();
        let reply: Request<TicketCheckResponse> = el.deferred();
        el.resolve_after(&reply, 25, TicketCheckResponse::valid());

        let queue = PendingOperationQueue::default();
        let (vm, _) = fields_with(reply);
        let mut vm = vm.with_pending_queue(queue.clone());
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());

        vm.check_ticket_id().unwrap();
        assert_eq!(queue.len(), 1);

        el.run_until_idle();
        assert!(queue.is_empty());
        assert!(vm.ticket_check().successful);
    }

    #[test]
    fn test_check_refused_by_shut_down_loop_resets_flags() {
        let el = EventLoop::new();
        let reply: Request<TicketCheckResponse> = el.deferred();
        el.shutdown();

        let (vm, _) = fields_with(reply);
        let mut vm = vm.with_pending_queue(PendingOperationQueue::default());
        vm.instance_mut().issue_tracker.issue_id = Some("55".to_string());

        let err = vm.check_ticket_id().unwrap_err();
        assert!(err.is_invalid_handle());
        assert_eq!(vm.ticket_check(), TicketIdCheck::default());
    }

    #[test]
    fn test_state_labels() {
        assert_eq!(TicketLinkState::GenerateNew.to_string(), "Generate new ticket");
        assert_eq!(
            serde_json::to_string(&TicketLinkState::LinkToExisting).unwrap(),
            "\"LINK_TO_EXISTING\""
        );
    }

    #[test]
    fn test_response_from_json() {
        let response: TicketCheckResponse =
            serde_json::from_str(r#"{"valid": false, "msg": "invalid", "type": null, "id": null}"#).unwrap();
        assert_eq!(response, TicketCheckResponse::invalid("invalid"));
    }
}
