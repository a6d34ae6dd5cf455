//! In-memory editor host for exercising the lock core.

use std::sync::Arc;
use std::time::Duration;

use marginalia_primitives::{ActivationEvent, AttributeMutation, EditorInstanceRef, ElementId, HostVariant, InstanceId, LockControl, LockSignals};
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use tokio::sync::mpsc;
use tokio::time::Instant;

use crate::error::HostError;
use crate::host::LockHost;
use crate::signal::SignalRules;

const LOCKED_LABEL: &str = "Locked";
const UNLOCKED_LABEL: &str = "Unlocked";

struct FakeControl {
	element: ElementId,
	subtype: Option<String>,
	icon: Option<String>,
	label: Option<String>,
	/// Label the host will show once the instant passes.
	pending_label: Option<(Instant, String)>,
}

impl FakeControl {
	fn new(element: ElementId, signals: LockSignals) -> Self {
		Self {
			element,
			subtype: signals.subtype,
			icon: signals.icon,
			label: signals.label,
			pending_label: None,
		}
	}

	fn snapshot(&mut self) -> LockControl {
		if let Some((at, _)) = &self.pending_label
			&& Instant::now() >= *at
			&& let Some((_, label)) = self.pending_label.take()
		{
			self.label = Some(label);
		}
		LockControl {
			element: self.element,
			signals: LockSignals {
				subtype: self.subtype.clone(),
				label: self.label.clone(),
				icon: self.icon.clone(),
			},
		}
	}
}

#[derive(Default)]
struct FakeState {
	variant: HostVariant,
	instances: Vec<EditorInstanceRef>,
	selection_owner: Option<InstanceId>,
	controls: FxHashMap<InstanceId, FakeControl>,
	parents: FxHashMap<ElementId, ElementId>,
	activations: Vec<ElementId>,
	reject_activations: bool,
	freeze_labels: bool,
	label_lag: Duration,
	mutations_on_toggle: bool,
}

/// Scriptable host with toggling lock controls.
///
/// Activating a control flips its subtype, icon and label the way a real
/// host's click handler would. Labels can lag behind or stay frozen to
/// exercise restore confirmation.
#[derive(Default)]
pub struct FakeHost {
	state: Mutex<FakeState>,
	activation_listeners: Mutex<Vec<mpsc::UnboundedSender<ActivationEvent>>>,
	attribute_listeners: Mutex<Vec<mpsc::UnboundedSender<AttributeMutation>>>,
}

impl FakeHost {
	pub fn new() -> Arc<Self> {
		Arc::new(Self::default())
	}

	pub fn root_of(id: InstanceId) -> ElementId {
		ElementId(id.0 * 1000)
	}

	pub fn control_of(id: InstanceId) -> ElementId {
		ElementId(id.0 * 1000 + 1)
	}

	/// Icon element nested inside the instance's lock control.
	pub fn control_icon_of(id: InstanceId) -> ElementId {
		ElementId(id.0 * 1000 + 2)
	}

	pub fn set_variant(&self, variant: HostVariant) {
		self.state.lock().variant = variant;
	}

	/// Registers an instance without a lock control.
	pub fn add_instance(&self, id: InstanceId) -> EditorInstanceRef {
		let inst = EditorInstanceRef::new(id, Self::root_of(id));
		self.state.lock().instances.push(inst.clone());
		inst
	}

	/// Registers an instance whose control shows the given lock state.
	pub fn add_instance_with_lock(&self, id: InstanceId, locked: bool) -> ElementId {
		self.add_instance(id);
		let element = Self::control_of(id);
		self.set_control(id, element, toggled_signals(locked));
		element
	}

	pub fn update_instance(&self, id: InstanceId, f: impl FnOnce(&mut EditorInstanceRef)) {
		let mut state = self.state.lock();
		if let Some(inst) = state.instances.iter_mut().find(|i| i.id == id) {
			f(inst);
		}
	}

	pub fn remove_instance(&self, id: InstanceId) {
		let mut state = self.state.lock();
		state.instances.retain(|i| i.id != id);
		state.controls.remove(&id);
	}

	/// Installs or replaces the instance's control without notifying observers.
	pub fn set_control(&self, id: InstanceId, element: ElementId, signals: LockSignals) {
		let mut state = self.state.lock();
		let root = Self::root_of(id);
		state.parents.insert(element, root);
		state.parents.insert(Self::control_icon_of(id), element);
		state.controls.insert(id, FakeControl::new(element, signals));
	}

	pub fn remove_control(&self, id: InstanceId) {
		self.state.lock().controls.remove(&id);
	}

	/// Replaces the control's signals without notifying observers.
	pub fn set_signals(&self, id: InstanceId, signals: LockSignals) {
		let mut state = self.state.lock();
		if let Some(control) = state.controls.get_mut(&id) {
			let element = control.element;
			*control = FakeControl::new(element, signals);
		}
	}

	/// Replaces the control's signals and reports an attribute mutation.
	pub fn mutate_signals(&self, id: InstanceId, signals: LockSignals) {
		self.set_signals(id, signals);
		if let Some(element) = self.state.lock().controls.get(&id).map(|c| c.element) {
			self.emit_mutation(element, "data-subtype");
		}
	}

	pub fn set_selection_owner(&self, owner: Option<InstanceId>) {
		self.state.lock().selection_owner = owner;
	}

	pub fn reject_activations(&self, reject: bool) {
		self.state.lock().reject_activations = reject;
	}

	/// Keeps labels unchanged across toggles.
	pub fn freeze_labels(&self, freeze: bool) {
		self.state.lock().freeze_labels = freeze;
	}

	/// Delays label updates after a toggle.
	pub fn set_label_lag(&self, lag: Duration) {
		self.state.lock().label_lag = lag;
	}

	/// Reports an attribute mutation for every toggle, like a live DOM.
	pub fn mutations_on_toggle(&self, enabled: bool) {
		self.state.lock().mutations_on_toggle = enabled;
	}

	/// A user click: capture listeners see it first, then it bubbles up to
	/// the enclosing lock control, which toggles.
	///
	/// Fails with [`HostError::Detached`] when no lock control encloses `target`.
	pub fn click(&self, target: ElementId) -> Result<(), HostError> {
		self.activation_listeners
			.lock()
			.retain(|tx| tx.send(ActivationEvent { target }).is_ok());
		self.toggle_at(target)
	}

	pub fn emit_mutation(&self, target: ElementId, attribute: &str) {
		self.attribute_listeners.lock().retain(|tx| {
			tx.send(AttributeMutation {
				target,
				attribute: attribute.to_string(),
			})
			.is_ok()
		});
	}

	/// Structural lock state of the instance's control.
	pub fn is_locked(&self, id: InstanceId) -> Option<bool> {
		let mut state = self.state.lock();
		let control = state.controls.get_mut(&id)?;
		Some(SignalRules::default().classify(&control.snapshot().signals).is_locked)
	}

	/// Current label of the instance's control.
	pub fn label(&self, id: InstanceId) -> Option<String> {
		let mut state = self.state.lock();
		state.controls.get_mut(&id)?.snapshot().signals.label
	}

	/// Elements activated through [`LockHost::activate`], in order.
	pub fn activations(&self) -> Vec<ElementId> {
		self.state.lock().activations.clone()
	}

	pub fn activation_count(&self) -> usize {
		self.state.lock().activations.len()
	}

	/// Live (activation, attribute) listener counts.
	pub fn listener_counts(&self) -> (usize, usize) {
		let activations = self.activation_listeners.lock().iter().filter(|tx| !tx.is_closed()).count();
		let attributes = self.attribute_listeners.lock().iter().filter(|tx| !tx.is_closed()).count();
		(activations, attributes)
	}

	fn toggle_at(&self, element: ElementId) -> Result<(), HostError> {
		let mut state = self.state.lock();
		let freeze = state.freeze_labels;
		let lag = state.label_lag;
		let Some(id) = enclosing_control(&state, element) else {
			return Err(HostError::Detached(element));
		};
		let Some(control) = state.controls.get_mut(&id) else {
			return Err(HostError::Detached(element));
		};

		let control_element = control.element;
		let was_locked = SignalRules::default().classify(&control.snapshot().signals).is_locked;
		let next = toggled_signals(!was_locked);
		control.subtype = next.subtype;
		control.icon = next.icon;
		if !freeze {
			let label = next.label.unwrap_or_default();
			if lag.is_zero() {
				control.label = Some(label);
			} else {
				control.pending_label = Some((Instant::now() + lag, label));
			}
		}
		let notify = state.mutations_on_toggle;
		drop(state);

		if notify {
			self.emit_mutation(control_element, "data-subtype");
		}
		Ok(())
	}
}

/// Instance whose lock control is `element` or one of its ancestors.
fn enclosing_control(state: &FakeState, element: ElementId) -> Option<InstanceId> {
	let mut cursor = Some(element);
	while let Some(e) = cursor {
		if let Some((id, _)) = state.controls.iter().find(|(_, c)| c.element == e) {
			return Some(*id);
		}
		cursor = state.parents.get(&e).copied();
	}
	None
}

fn toggled_signals(locked: bool) -> LockSignals {
	if locked {
		LockSignals::default().subtype("lock").icon("#iconLock").label(LOCKED_LABEL)
	} else {
		LockSignals::default().subtype("unlock").icon("#iconUnlock").label(UNLOCKED_LABEL)
	}
}

impl LockHost for FakeHost {
	fn variant(&self) -> HostVariant {
		self.state.lock().variant
	}

	fn instances(&self) -> Vec<EditorInstanceRef> {
		let state = self.state.lock();
		state
			.instances
			.iter()
			.map(|inst| EditorInstanceRef {
				lock_control: state.controls.get(&inst.id).map(|c| c.element),
				..inst.clone()
			})
			.collect()
	}

	fn selection_owner(&self) -> Option<InstanceId> {
		self.state.lock().selection_owner
	}

	fn lock_control(&self, instance: &EditorInstanceRef) -> Option<LockControl> {
		self.state.lock().controls.get_mut(&instance.id).map(FakeControl::snapshot)
	}

	fn activate(&self, element: ElementId) -> Result<(), HostError> {
		{
			let mut state = self.state.lock();
			if state.reject_activations {
				return Err(HostError::Dispatch(format!("{element} ignored the activation")));
			}
			state.activations.push(element);
		}
		self.activation_listeners
			.lock()
			.retain(|tx| tx.send(ActivationEvent { target: element }).is_ok());
		self.toggle_at(element)
	}

	fn is_within_lock_control(&self, element: ElementId) -> bool {
		enclosing_control(&self.state.lock(), element).is_some()
	}

	fn contains_lock_control(&self, element: ElementId) -> bool {
		let state = self.state.lock();
		state.controls.values().any(|c| {
			let mut cursor = Some(c.element);
			while let Some(e) = cursor {
				if e == element {
					return true;
				}
				cursor = state.parents.get(&e).copied();
			}
			false
		})
	}

	fn intercept_activations(&self) -> mpsc::UnboundedReceiver<ActivationEvent> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.activation_listeners.lock().push(tx);
		rx
	}

	fn observe_attributes(&self) -> mpsc::UnboundedReceiver<AttributeMutation> {
		let (tx, rx) = mpsc::unbounded_channel();
		self.attribute_listeners.lock().push(tx);
		rx
	}
}
