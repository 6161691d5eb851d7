//! Drives a Zoom MS-70CDR from the remote's buttons.
//!
//! One protocol exchange is in flight at a time. Chained exchanges go
//! through a single "next task" cell that is picked up as soon as the
//! controller is back to `Waiting` with no task.

use crate::config::ControllerConfig;
use crate::devices::zoom::ms70cdr::{
    is_identity_response, is_patch_dump, ParamEdit, PatchBlob, CURRENT_PATCH_REQUEST, CURRENT_PROGRAM_REQUEST,
    EDITOR_OFF, EDITOR_ON, IDENTITY_REQUEST, MAX_SLOTS,
};
use crate::event::{Actions, Event};
use crate::input::{Button, ButtonAction};
use crate::midi::{CodeIndexNumber, MidiError, Packet, Program, ProgramChangeMessage, SysexCapture, U7};
use crate::output::LedStates;
use crate::session::{DeviceAddress, DeviceSession, DeviceStatus};
use crate::time::{self, Instant};
use core::convert::TryFrom;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ControllerState {
    /// No usable device
    #[default]
    Idle,
    /// Ready for a new task
    Waiting,
    /// A protocol exchange is outstanding
    Busy,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum SessionTask {
    #[default]
    None,
    IdentifyRequest,
    EditorOnRequest,
    CurrentPatchRequest,
    CurrentPatchSend,
    SetParamRequest,
    ToggleEffectRequest,
    ProgramChangeRequest,
    CurrentProgramRequest,
    ToggleEffectState,
}

impl SessionTask {
    /// Tasks completed by an answer from the pedal, subject to timeout
    pub fn expects_response(&self) -> bool {
        matches!(self,
            SessionTask::IdentifyRequest
            | SessionTask::CurrentPatchRequest
            | SessionTask::SetParamRequest
            | SessionTask::ToggleEffectRequest
            | SessionTask::ProgramChangeRequest
            | SessionTask::CurrentProgramRequest)
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TaskPhase {
    /// Queued in the next task cell
    Requested,
    /// Sent, waiting for completion
    Pending,
    /// Completed, nothing newer since
    Received,
}

/// Serializes every access when events come from more than one context
pub type SharedController = spin::Mutex<Controller>;

#[derive(Debug)]
pub struct Controller {
    config: ControllerConfig,
    state: ControllerState,
    task: SessionTask,
    next: Option<SessionTask>,
    received: Option<SessionTask>,
    // dispatch time of the current task
    since: Instant,
    now: Instant,
    session: DeviceSession,
    sysex: SysexCapture,
    program_change: ProgramChangeMessage,
    // filled before requesting ToggleEffectRequest or SetParamRequest
    param_edit: ParamEdit,
    // slot flipped by ToggleEffectState
    toggle_slot: u8,
}

impl Default for Controller {
    fn default() -> Self {
        Controller::new(ControllerConfig::default())
    }
}

impl Controller {
    pub fn new(config: ControllerConfig) -> Self {
        Controller {
            config,
            state: ControllerState::Idle,
            task: SessionTask::None,
            next: None,
            received: None,
            since: time::millis(0),
            now: time::millis(0),
            session: DeviceSession::default(),
            sysex: SysexCapture::new(),
            program_change: ProgramChangeMessage::default(),
            param_edit: ParamEdit::default(),
            toggle_slot: 0,
        }
    }

    pub fn shared(config: ControllerConfig) -> SharedController {
        spin::Mutex::new(Controller::new(config))
    }

    /// Single entry point: apply the event, then advance the state machine once.
    /// The returned actions must be applied to the transport in order.
    pub fn handle_event(&mut self, now: Instant, event: Event) -> Result<Actions, MidiError> {
        self.now = now;
        let mut actions = Actions::default();
        match event {
            Event::Mounted(address) => self.mounted(address),
            Event::Configured(address) => self.configured(address),
            Event::Unmounted(address) => self.unmounted(address),
            Event::Packet(address, packet) => {
                if self.session.owns(address) {
                    self.receive(&packet);
                } else {
                    trace!("packet from foreign device {:?}", address);
                }
            }
            Event::ButtonReleased(button) => self.button_released(button, &mut actions)?,
            Event::Poll => {}
        }
        self.step(&mut actions)?;
        Ok(actions)
    }

    fn mounted(&mut self, address: DeviceAddress) {
        info!("device {:?} connected", address);
        self.reset();
        self.session.mount(address);
    }

    fn configured(&mut self, address: DeviceAddress) {
        if !self.session.owns(address) {
            warn!("configured device {:?} was never mounted", address);
            return;
        }
        // the host stack may report the same device more than once
        if self.session.status() != DeviceStatus::Connected {
            debug!("device {:?} already configured", address);
            return;
        }
        self.session.set_status(DeviceStatus::Ready);
        self.state = ControllerState::Waiting;
        self.request(SessionTask::IdentifyRequest);
    }

    fn unmounted(&mut self, address: DeviceAddress) {
        if self.session.owns(address) {
            info!("device {:?} disconnected", address);
            self.reset();
        }
    }

    fn reset(&mut self) {
        self.state = ControllerState::Idle;
        self.task = SessionTask::None;
        self.next = None;
        self.received = None;
        self.sysex.clear();
        self.program_change.clear();
        self.session.unmount();
    }

    /// Route an inbound packet by code index number
    fn receive(&mut self, packet: &Packet) {
        match packet.code_index_number() {
            Ok(cin) if cin.is_sysex() => {
                if let Err(err) = self.sysex.push_packet(packet) {
                    warn!("inbound sysex dropped: {:?}", err);
                }
            }
            Ok(CodeIndexNumber::ProgramChange) => self.program_change.capture(packet),
            Ok(CodeIndexNumber::ControlChange) => {}
            Ok(cin) => trace!("ignored {:?} packet", cin),
            Err(err) => debug!("bad packet {:?}", err),
        }
    }

    fn button_released(&mut self, button: Button, actions: &mut Actions) -> Result<(), MidiError> {
        if self.state != ControllerState::Waiting || self.task != SessionTask::None {
            debug!("{:?} ignored, controller {:?}", button, self.state);
            return Ok(());
        }
        if !self.session.is_identified() {
            self.request(SessionTask::IdentifyRequest);
            return Ok(());
        }
        match button.action() {
            Some(ButtonAction::ProgramDown) => {
                let program = u8::from(self.session.program()).saturating_sub(1);
                self.change_program(program, actions)?;
            }
            Some(ButtonAction::ProgramUp) => {
                let program = u8::from(self.session.program()).saturating_add(1);
                self.change_program(program, actions)?;
            }
            Some(ButtonAction::ToggleEffect(slot)) => {
                let patch = self.session.patch_mut();
                if !patch.is_valid() {
                    warn!("no patch loaded, slot {} ignored", slot);
                    return Ok(());
                }
                patch.set_current_effect(slot);
                patch.toggle_effect_enabled(slot);
                self.session.refresh();
                self.request(SessionTask::CurrentPatchSend);
            }
            None => warn!("unmapped {:?}", button),
        }
        Ok(())
    }

    /// Queue the next task, last write wins. Returns the request it displaced.
    /// Requesting `SessionTask::None` cancels the queued request.
    pub fn request(&mut self, task: SessionTask) -> Option<SessionTask> {
        if task == SessionTask::None {
            return self.next.take();
        }
        let displaced = self.next.replace(task);
        if let Some(displaced) = displaced {
            warn!("{:?} replaces queued {:?}", task, displaced);
        }
        displaced
    }

    /// Switch effect `slot` on the pedal to the opposite of the working patch
    pub fn request_toggle_effect(&mut self, slot: u8) -> Result<Option<SessionTask>, MidiError> {
        if slot as usize >= MAX_SLOTS {
            return Err(MidiError::InvalidEffectSlot(slot));
        }
        let on = !self.session.patch().effect_enabled(slot);
        self.param_edit = ParamEdit::toggle_effect(U7::try_from(slot)?, on);
        Ok(self.request(SessionTask::ToggleEffectRequest))
    }

    pub fn request_param_edit(&mut self, effect: U7, param: U7, value: U7) -> Result<Option<SessionTask>, MidiError> {
        self.param_edit = ParamEdit::parameter(effect, param, value)?;
        Ok(self.request(SessionTask::SetParamRequest))
    }

    /// Flip the effect bit in the working patch only
    pub fn request_toggle_effect_state(&mut self, slot: u8) -> Option<SessionTask> {
        self.toggle_slot = slot;
        self.request(SessionTask::ToggleEffectState)
    }

    /// Clamp and store the program, sending it right away when the controller is free
    pub fn set_current_program(&mut self, program: u8) -> Result<Actions, MidiError> {
        let mut actions = Actions::default();
        self.change_program(program, &mut actions)?;
        self.step(&mut actions)?;
        Ok(actions)
    }

    fn change_program(&mut self, program: u8, actions: &mut Actions) -> Result<(), MidiError> {
        let (min, max) = self.config.program_range;
        let program: Program = U7::clamp_to(program, min, max);
        self.session.set_program(program);

        if self.state == ControllerState::Waiting && self.task == SessionTask::None {
            self.state = ControllerState::Busy;
            self.task = SessionTask::ProgramChangeRequest;
            debug!("program change {}", u8::from(program));
            actions.send_packet(Packet::program_change(self.config.channel, program))?;
            self.state = ControllerState::Waiting;
            self.task = SessionTask::None;
            self.request(SessionTask::CurrentProgramRequest);
        }
        Ok(())
    }

    /// Leave editor mode, not tied to a task
    pub fn disable_editor(&mut self) -> Result<Actions, MidiError> {
        let mut actions = Actions::default();
        if self.session.address().is_some() {
            actions.send_sysex(&EDITOR_OFF)?;
            if self.session.status() == DeviceStatus::EditorOn {
                self.session.set_status(DeviceStatus::Identified);
            }
        }
        Ok(actions)
    }

    /// Complete the running task if possible, then dispatch the queued one
    fn step(&mut self, actions: &mut Actions) -> Result<(), MidiError> {
        if self.state == ControllerState::Busy {
            self.poll_task(actions)?;
        }
        if self.state == ControllerState::Waiting && self.task == SessionTask::None {
            if let Some(next) = self.next.take() {
                self.dispatch(next, actions)?;
            }
        }
        Ok(())
    }

    fn dispatch(&mut self, task: SessionTask, actions: &mut Actions) -> Result<(), MidiError> {
        // a stale message must never complete the new task
        self.sysex.clear();
        self.program_change.clear();
        self.received = None;

        match task {
            SessionTask::None => return Ok(()),
            SessionTask::IdentifyRequest => actions.send_sysex(&IDENTITY_REQUEST)?,
            SessionTask::EditorOnRequest => actions.send_sysex(&EDITOR_ON)?,
            SessionTask::CurrentPatchRequest => actions.send_sysex(&CURRENT_PATCH_REQUEST)?,
            SessionTask::CurrentProgramRequest => actions.send_sysex(&CURRENT_PROGRAM_REQUEST)?,
            SessionTask::CurrentPatchSend => {
                let patch = self.session.patch();
                if !patch.is_valid() {
                    warn!("no valid patch to send");
                    return Ok(());
                }
                trace!("sending patch {:02x?}", patch.as_bytes());
                actions.send_sysex(patch.as_bytes())?;
            }
            SessionTask::ToggleEffectRequest | SessionTask::SetParamRequest => {
                actions.send_sysex(self.param_edit.as_bytes())?
            }
            // sent by whoever requested it, only wait for the echo
            SessionTask::ProgramChangeRequest => {}
            SessionTask::ToggleEffectState => {
                self.session.patch_mut().toggle_effect_enabled(self.toggle_slot);
                self.session.refresh();
            }
        }

        debug!("{:?} dispatched", task);
        self.state = ControllerState::Busy;
        self.task = task;
        self.since = self.now;
        Ok(())
    }

    fn poll_task(&mut self, actions: &mut Actions) -> Result<(), MidiError> {
        match self.task {
            SessionTask::None => self.finish(),
            SessionTask::IdentifyRequest => {
                if let Some(supported) = self.sysex.message().map(is_identity_response) {
                    self.sysex.clear();
                    self.finish();
                    if supported {
                        info!("MS-70CDR identified");
                        self.session.set_status(DeviceStatus::Identified);
                        actions.send_sysex(&EDITOR_ON)?;
                        self.session.set_status(DeviceStatus::EditorOn);
                        self.request(SessionTask::CurrentProgramRequest);
                    } else {
                        warn!("device identity not supported");
                        self.session.set_status(DeviceStatus::IdentifiedNotSupported);
                    }
                }
            }
            SessionTask::EditorOnRequest => {
                if self.session.status() == DeviceStatus::Identified {
                    self.session.set_status(DeviceStatus::EditorOn);
                }
                self.finish();
            }
            SessionTask::CurrentPatchSend => {
                self.finish();
                self.request(SessionTask::CurrentPatchRequest);
            }
            SessionTask::ToggleEffectState => self.finish(),
            SessionTask::CurrentProgramRequest | SessionTask::ProgramChangeRequest => {
                let channel = self.program_change.channel();
                if let Some(program) = self.program_change.consume() {
                    debug!("program {} on channel {}", u8::from(program), channel);
                    self.session.set_program(program);
                    self.finish();
                    self.request(SessionTask::CurrentPatchRequest);
                }
            }
            SessionTask::CurrentPatchRequest => {
                let dump = self.sysex.message().map(|message| {
                    if is_patch_dump(message) {
                        PatchBlob::from_slice(message).ok()
                    } else {
                        warn!("unexpected {} bytes sysex while waiting for patch", message.len());
                        None
                    }
                });
                if let Some(dump) = dump {
                    if let Some(patch) = dump {
                        trace!("received patch {:02x?}", patch.as_bytes());
                        self.session.load_patch(patch);
                    }
                    self.sysex.clear();
                    self.finish();
                }
            }
            SessionTask::ToggleEffectRequest | SessionTask::SetParamRequest => {
                if self.sysex.is_complete() {
                    self.sysex.clear();
                    self.finish();
                }
            }
        }

        if self.state == ControllerState::Busy && self.task.expects_response() && self.timed_out() {
            warn!("{:?} timed out", self.task);
            self.sysex.clear();
            self.program_change.clear();
            self.state = ControllerState::Waiting;
            self.task = SessionTask::None;
            if self.config.reidentify_on_timeout {
                self.request(SessionTask::IdentifyRequest);
            }
        }
        Ok(())
    }

    fn timed_out(&self) -> bool {
        time::elapsed(self.now, self.since) >= self.config.response_timeout
    }

    fn finish(&mut self) {
        debug!("{:?} complete", self.task);
        if self.task != SessionTask::None {
            self.received = Some(self.task);
        }
        self.state = ControllerState::Waiting;
        self.task = SessionTask::None;
    }

    pub fn state(&self) -> ControllerState {
        self.state
    }

    pub fn task(&self) -> SessionTask {
        self.task
    }

    pub fn queued(&self) -> Option<SessionTask> {
        self.next
    }

    /// Most advanced task lifecycle: outstanding, else queued, else last completed
    pub fn phase(&self) -> Option<(SessionTask, TaskPhase)> {
        if self.state == ControllerState::Busy {
            Some((self.task, TaskPhase::Pending))
        } else if let Some(next) = self.next {
            Some((next, TaskPhase::Requested))
        } else {
            self.received.map(|task| (task, TaskPhase::Received))
        }
    }

    pub fn session(&self) -> &DeviceSession {
        &self.session
    }

    pub fn config(&self) -> &ControllerConfig {
        &self.config
    }

    pub fn leds(&self) -> LedStates {
        LedStates::from_session(&self.session)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::devices::zoom::ms70cdr::{MS_70CDR, PATCH_DATA, PATCH_LEN};
    use crate::event::Action;
    use crate::midi::{MessageState, SysexPackets};
    use core::convert::TryFrom;
    use std::vec::Vec;

    const PEDAL: DeviceAddress = DeviceAddress(1);

    fn identity_response(model: u8) -> [u8; 15] {
        [0xF0, 0x7E, 0x00, 0x06, 0x02, 0x52, model, 0x00, 0x00, 0x00, 0x32, 0x2E, 0x31, 0x30, 0xF7]
    }

    fn patch_dump(max_effects: u8, enabled: &[usize]) -> [u8; PATCH_LEN] {
        let mut dump = [0u8; PATCH_LEN];
        dump[0] = 0xF0;
        dump[1] = 0x52;
        dump[3] = MS_70CDR;
        dump[4] = PATCH_DATA;
        dump[130] = max_effects << 2;
        dump[129] = 0x40;
        dump[PATCH_LEN - 1] = 0xF7;
        for idx in enabled {
            dump[*idx] |= 0x01;
        }
        dump
    }

    /// Complete sysex messages found in the actions
    fn sent_sysex(actions: &Actions) -> Vec<Vec<u8>> {
        let mut capture = SysexCapture::new();
        let mut sent = Vec::new();
        for packet in actions.packets() {
            if capture.push_packet(&packet) == Ok(MessageState::Complete) {
                sent.extend(capture.message().map(|m| m.to_vec()));
                capture.clear();
            }
        }
        sent
    }

    impl Controller {
        fn at(&mut self, now: u32, event: Event) -> Actions {
            self.handle_event(time::millis(now), event).unwrap()
        }

        /// Deliver a message from the pedal, returns the actions of the last packet
        fn reply(&mut self, now: u32, message: &[u8]) -> Actions {
            let mut last = Actions::default();
            for packet in SysexPackets::new(message).unwrap() {
                last = self.at(now, Event::Packet(PEDAL, packet));
            }
            last
        }

        fn reply_program(&mut self, now: u32, program: u8) -> Actions {
            self.at(now, Event::Packet(PEDAL, Packet::from_raw([0x0C, 0xC0, program, 0])))
        }

        fn assert_state(&self, state: ControllerState, task: SessionTask) {
            assert_eq!((self.state(), self.task()), (state, task), "queued {:?}", self.queued());
        }
    }

    fn configured() -> (Controller, Actions) {
        let mut ctl = Controller::default();
        assert!(ctl.at(0, Event::Mounted(PEDAL)).is_empty());
        assert_eq!(ctl.session().status(), DeviceStatus::Connected);
        let actions = ctl.at(0, Event::Configured(PEDAL));
        (ctl, actions)
    }

    /// Identified, program and patch loaded
    fn ready() -> Controller {
        let (mut ctl, _) = configured();
        ctl.reply(10, &identity_response(MS_70CDR));
        ctl.reply_program(20, 12);
        ctl.reply(30, &patch_dump(4, &[6, 47]));
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        ctl
    }

    #[test]
    fn configure_sends_identity_request() {
        let (ctl, actions) = configured();
        assert_eq!(sent_sysex(&actions), [IDENTITY_REQUEST.to_vec()]);
        assert_eq!(actions.iter().last(), Some(&Action::Flush));
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
        assert_eq!(ctl.session().status(), DeviceStatus::Ready);
        assert_eq!(ctl.phase(), Some((SessionTask::IdentifyRequest, TaskPhase::Pending)));
        assert!(ctl.leds().is_on(0));
    }

    #[test]
    fn identification_chains_program_then_patch() {
        let (mut ctl, _) = configured();

        let actions = ctl.reply(10, &identity_response(MS_70CDR));
        assert_eq!(sent_sysex(&actions), [EDITOR_ON.to_vec(), CURRENT_PROGRAM_REQUEST.to_vec()]);
        assert_eq!(ctl.session().status(), DeviceStatus::EditorOn);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentProgramRequest);
        assert!(ctl.leds().is_on(1));

        let actions = ctl.reply_program(20, 12);
        assert_eq!(sent_sysex(&actions), [CURRENT_PATCH_REQUEST.to_vec()]);
        assert_eq!(u8::from(ctl.session().program()), 12);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchRequest);

        let actions = ctl.reply(30, &patch_dump(4, &[6, 47]));
        assert!(actions.is_empty());
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.phase(), Some((SessionTask::CurrentPatchRequest, TaskPhase::Received)));
        assert_eq!(ctl.session().max_effects(), 4);
        assert_eq!(ctl.session().current_effect(), 4);
        assert!(ctl.session().patch().is_valid());
        assert_eq!(ctl.leds(), LedStates([true, true, true, false, true, false, false, false]));
    }

    #[test]
    fn wrong_identity_is_not_supported() {
        let (mut ctl, _) = configured();
        let actions = ctl.reply(10, &identity_response(0x5F));
        assert!(actions.is_empty());
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.session().status(), DeviceStatus::IdentifiedNotSupported);

        // next press tries again
        let actions = ctl.at(20, Event::ButtonReleased(Button(3)));
        assert_eq!(sent_sysex(&actions), [IDENTITY_REQUEST.to_vec()]);
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }

    #[test]
    fn buttons_ignored_while_busy() {
        let (mut ctl, _) = configured();
        let actions = ctl.at(5, Event::ButtonReleased(Button(1)));
        assert!(actions.is_empty());
        assert_eq!(ctl.queued(), None);
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }

    #[test]
    fn program_buttons_step_and_clamp() {
        let mut ctl = ready();
        let actions = ctl.at(40, Event::ButtonReleased(Button(1)));
        let packets: Vec<Packet> = actions.packets().collect();
        assert_eq!(packets[0], Packet::from_raw([0x0C, 0xC1, 13, 0]));
        assert_eq!(sent_sysex(&actions), [CURRENT_PROGRAM_REQUEST.to_vec()]);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentProgramRequest);

        ctl.reply_program(50, 13);
        ctl.reply(60, &patch_dump(4, &[]));
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(u8::from(ctl.session().program()), 13);
    }

    #[test]
    fn program_clamp() {
        let mut ctl = ready();
        for (wanted, expected) in [(0, 1), (50, 49), (25, 25)] {
            let actions = ctl.set_current_program(wanted).unwrap();
            assert_eq!(u8::from(ctl.session().program()), expected);
            assert_eq!(actions.packets().next(), Some(Packet::from_raw([0x0C, 0xC1, expected, 0])));
            ctl.reply_program(100, expected);
            ctl.reply(110, &patch_dump(4, &[]));
        }
    }

    #[test]
    fn program_stored_but_not_sent_while_busy() {
        let (mut ctl, _) = configured();
        let actions = ctl.set_current_program(7).unwrap();
        assert!(actions.is_empty());
        assert_eq!(u8::from(ctl.session().program()), 7);
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }

    #[test]
    fn effect_button_sends_patch_then_reads_back() {
        let mut ctl = ready();
        assert!(!ctl.session().patch().effect_enabled(1));

        let actions = ctl.at(40, Event::ButtonReleased(Button(3)));
        let sent = sent_sysex(&actions);
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].len(), PATCH_LEN);
        assert_eq!(actions.packets().count(), 49);
        assert!(ctl.session().patch().effect_enabled(1));
        assert_eq!(ctl.session().current_effect(), 1);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchSend);

        let actions = ctl.at(41, Event::Poll);
        assert_eq!(sent_sysex(&actions), [CURRENT_PATCH_REQUEST.to_vec()]);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchRequest);
    }

    #[test]
    fn invalid_patch_is_never_sent() {
        let (mut ctl, _) = configured();
        ctl.reply(10, &identity_response(MS_70CDR));
        ctl.reply_program(20, 12);
        // garbage instead of the patch
        ctl.reply(30, &[0xF0, 0x01, 0xF7]);
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);

        let before = ctl.session().patch().clone();
        let actions = ctl.at(40, Event::ButtonReleased(Button(2)));
        assert!(actions.is_empty());
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.queued(), None);
        // nothing to edit yet
        assert_eq!(ctl.session().patch(), &before);
        assert_eq!(ctl.session().patch().as_bytes(), PatchBlob::default().as_bytes());
    }

    #[test]
    fn last_request_wins() {
        let mut ctl = Controller::default();
        assert_eq!(ctl.request(SessionTask::CurrentPatchRequest), None);
        assert_eq!(ctl.request(SessionTask::EditorOnRequest), Some(SessionTask::CurrentPatchRequest));
        assert_eq!(ctl.phase(), Some((SessionTask::EditorOnRequest, TaskPhase::Requested)));
        assert_eq!(ctl.request(SessionTask::None), Some(SessionTask::EditorOnRequest));
        assert_eq!(ctl.queued(), None);
    }

    #[test]
    fn idle_controller_never_dispatches() {
        let mut ctl = Controller::default();
        ctl.request(SessionTask::CurrentPatchRequest);
        assert!(ctl.at(0, Event::Poll).is_empty());
        ctl.assert_state(ControllerState::Idle, SessionTask::None);
    }

    #[test]
    fn toggle_effect_request_uses_template() {
        let mut ctl = ready();
        assert_eq!(ctl.request_toggle_effect(2), Ok(None));
        let actions = ctl.at(40, Event::Poll);
        assert_eq!(sent_sysex(&actions), [vec![0xF0, 0x52, 0x00, 0x61, 0x31, 0x02, 0x00, 0x00, 0x00, 0xF7]]);
        ctl.assert_state(ControllerState::Busy, SessionTask::ToggleEffectRequest);

        ctl.reply(50, &[0xF0, 0x52, 0x00, 0x61, 0x00, 0xF7]);
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
    }

    #[test]
    fn param_edit_request() {
        let mut ctl = ready();
        ctl.request_param_edit(U7::MIN, U7::try_from(1).unwrap(), U7::try_from(100).unwrap()).unwrap();
        let actions = ctl.at(40, Event::Poll);
        assert_eq!(sent_sysex(&actions), [vec![0xF0, 0x52, 0x00, 0x61, 0x31, 0x00, 0x03, 100, 0x00, 0xF7]]);
        ctl.assert_state(ControllerState::Busy, SessionTask::SetParamRequest);
    }

    #[test]
    fn edit_requests_reject_non_data_bytes() {
        let mut ctl = ready();
        assert_eq!(ctl.request_toggle_effect(MAX_SLOTS as u8), Err(MidiError::InvalidEffectSlot(6)));
        assert_eq!(ctl.request_toggle_effect(0x80), Err(MidiError::InvalidEffectSlot(0x80)));
        assert_eq!(ctl.request_param_edit(U7::MIN, U7::try_from(0x7E).unwrap(), U7::MAX),
                   Err(MidiError::InvalidU7(0x80)));
        assert_eq!(ctl.queued(), None);
        assert!(ctl.at(40, Event::Poll).is_empty());
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);

        ctl.request_param_edit(U7::MAX, U7::try_from(0x7D).unwrap(), U7::MAX).unwrap();
        let sent = sent_sysex(&ctl.at(41, Event::Poll));
        assert_eq!(sent, [vec![0xF0, 0x52, 0x00, 0x61, 0x31, 0x7F, 0x7F, 0x7F, 0x00, 0xF7]]);
        assert!(sent[0][1..9].iter().all(|b| *b < 0x80));
    }

    #[test]
    fn repeated_configured_keeps_pending_identify() {
        let (mut ctl, _) = configured();
        let actions = ctl.at(5, Event::Configured(PEDAL));
        assert!(actions.is_empty());
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
        assert_eq!(ctl.queued(), None);
        assert_eq!(ctl.session().status(), DeviceStatus::Ready);

        let actions = ctl.reply(10, &identity_response(MS_70CDR));
        assert_eq!(sent_sysex(&actions), [EDITOR_ON.to_vec(), CURRENT_PROGRAM_REQUEST.to_vec()]);
        assert_eq!(ctl.session().status(), DeviceStatus::EditorOn);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentProgramRequest);
    }

    #[test]
    fn repeated_configured_leaves_ready_session_alone() {
        let mut ctl = ready();
        assert!(ctl.at(40, Event::Configured(PEDAL)).is_empty());
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.session().status(), DeviceStatus::EditorOn);
        assert_eq!(ctl.queued(), None);
    }

    #[test]
    fn repeated_configured_still_times_out() {
        let (mut ctl, _) = configured();
        ctl.at(5, Event::Configured(PEDAL));
        let actions = ctl.at(1500, Event::Poll);
        // expired identify is queued again and sent on the same step
        assert_eq!(sent_sysex(&actions), [IDENTITY_REQUEST.to_vec()]);
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }

    #[test]
    fn control_change_is_ignored() {
        let cc = Packet::from_raw([0x0B, 0xB0, 7, 100]);

        let (mut ctl, _) = configured();
        ctl.reply(10, &identity_response(MS_70CDR));
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentProgramRequest);
        assert!(ctl.at(15, Event::Packet(PEDAL, cc)).is_empty());
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentProgramRequest);

        ctl.reply_program(20, 12);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchRequest);
        assert!(ctl.at(25, Event::Packet(PEDAL, cc)).is_empty());
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchRequest);
        assert_eq!(u8::from(ctl.session().program()), 12);

        ctl.reply(30, &patch_dump(4, &[6]));
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
    }

    #[test]
    fn oversized_sysex_then_patch_dump() {
        let (mut ctl, _) = configured();
        ctl.reply(10, &identity_response(MS_70CDR));
        ctl.reply_program(20, 12);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchRequest);

        let mut oversized = vec![0x10u8; 200];
        oversized[0] = 0xF0;
        oversized[199] = 0xF7;
        let actions = ctl.reply(25, &oversized);
        assert!(actions.is_empty());
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentPatchRequest);
        assert!(!ctl.session().patch().is_valid());

        ctl.reply(30, &patch_dump(5, &[6, 26]));
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.session().max_effects(), 5);
        assert!(ctl.session().patch().effect_enabled(1));
    }

    #[test]
    fn toggle_effect_state_is_local() {
        let mut ctl = ready();
        assert!(ctl.session().patch().effect_enabled(0));
        ctl.request_toggle_effect_state(0);
        let actions = ctl.at(40, Event::Poll);
        assert!(actions.is_empty());
        assert!(!ctl.session().patch().effect_enabled(0));
        ctl.assert_state(ControllerState::Busy, SessionTask::ToggleEffectState);
        ctl.at(41, Event::Poll);
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert!(!ctl.leds().is_on(2));
    }

    #[test]
    fn editor_on_completes_without_answer() {
        let mut ctl = ready();
        ctl.disable_editor().unwrap();
        assert_eq!(ctl.session().status(), DeviceStatus::Identified);

        ctl.request(SessionTask::EditorOnRequest);
        let actions = ctl.at(40, Event::Poll);
        assert_eq!(sent_sysex(&actions), [EDITOR_ON.to_vec()]);
        ctl.at(41, Event::Poll);
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.session().status(), DeviceStatus::EditorOn);
    }

    #[test]
    fn disable_editor_sends_template() {
        let mut ctl = ready();
        let actions = ctl.disable_editor().unwrap();
        assert_eq!(sent_sysex(&actions), [EDITOR_OFF.to_vec()]);
        assert!(ctl.session().is_identified());
        assert!(Controller::default().disable_editor().unwrap().is_empty());
    }

    #[test]
    fn program_change_request_waits_for_echo() {
        let mut ctl = ready();
        ctl.request(SessionTask::ProgramChangeRequest);
        assert!(ctl.at(40, Event::Poll).is_empty());
        ctl.assert_state(ControllerState::Busy, SessionTask::ProgramChangeRequest);
        let actions = ctl.reply_program(50, 30);
        assert_eq!(sent_sysex(&actions), [CURRENT_PATCH_REQUEST.to_vec()]);
        assert_eq!(u8::from(ctl.session().program()), 30);
    }

    #[test]
    fn stale_messages_do_not_complete_tasks() {
        let mut ctl = ready();
        // unsolicited program change while idle
        ctl.reply_program(40, 3);
        ctl.request(SessionTask::CurrentProgramRequest);
        ctl.at(41, Event::Poll);
        ctl.assert_state(ControllerState::Busy, SessionTask::CurrentProgramRequest);
        assert_eq!(u8::from(ctl.session().program()), 12);
    }

    #[test]
    fn timeout_reidentifies() {
        let (mut ctl, _) = configured();
        assert!(ctl.at(999, Event::Poll).is_empty());
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);

        // times out then immediately retries
        let actions = ctl.at(1000, Event::Poll);
        assert_eq!(sent_sysex(&actions), [IDENTITY_REQUEST.to_vec()]);
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }

    #[test]
    fn timeout_without_retry() {
        let config = ControllerConfig { reidentify_on_timeout: false, ..ControllerConfig::default() };
        let mut ctl = Controller::new(config);
        ctl.at(0, Event::Mounted(PEDAL));
        ctl.at(0, Event::Configured(PEDAL));
        assert!(ctl.at(1500, Event::Poll).is_empty());
        ctl.assert_state(ControllerState::Waiting, SessionTask::None);
        assert_eq!(ctl.queued(), None);
    }

    #[test]
    fn foreign_packets_ignored() {
        let (mut ctl, _) = configured();
        for packet in SysexPackets::new(&identity_response(MS_70CDR)).unwrap() {
            ctl.at(5, Event::Packet(DeviceAddress(9), packet));
        }
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }

    #[test]
    fn unmount_resets_everything() {
        let mut ctl = ready();
        ctl.request(SessionTask::CurrentPatchRequest);
        ctl.at(40, Event::Unmounted(DeviceAddress(7)));
        assert!(ctl.leds().is_on(0));

        ctl.at(41, Event::Unmounted(PEDAL));
        ctl.assert_state(ControllerState::Idle, SessionTask::None);
        assert_eq!(ctl.queued(), None);
        assert_eq!(ctl.leds(), LedStates::DARK);
        assert_eq!(ctl.session().status(), DeviceStatus::Disconnected);
    }

    #[test]
    fn shared_across_threads() {
        use std::sync::Arc;

        let shared = Arc::new(Controller::shared(ControllerConfig::default()));
        shared.lock().handle_event(time::millis(0), Event::Mounted(PEDAL)).unwrap();
        shared.lock().handle_event(time::millis(0), Event::Configured(PEDAL)).unwrap();

        let handles: Vec<_> = (0..4u8)
            .map(|n| {
                let shared = shared.clone();
                std::thread::spawn(move || {
                    shared.lock().request_toggle_effect_state(n);
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        let ctl = shared.lock();
        assert!(ctl.queued().is_some());
        ctl.assert_state(ControllerState::Busy, SessionTask::IdentifyRequest);
    }
}
