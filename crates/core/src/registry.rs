//! Session registry and message dispatch
//!
//! The registry is the single authoritative record of session membership
//! and per-participant media-control state. It is an explicitly
//! constructed object (no ambient globals): the transport layer owns one
//! instance and feeds it every parsed inbound message.
//!
//! Dispatch is pure with respect to I/O: [`SessionRegistry::apply`]
//! mutates registry state and returns a [`DispatchOutcome`] naming the
//! reply for the sender, the events to push to other connections, and the
//! connections the transport must hang up. A stale or duplicate message
//! yields a benign outcome, never a panic; one session's garbage cannot
//! take down another's relay.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::auth::RoleDirectory;
use crate::error::{Error, Result};
use crate::protocol::{ClientMessage, ControlCommand, JoinReply, ServerEvent};
use crate::session::{validate_session_token, ConnectionId, Participant, Session, SessionState};

/// An event addressed to one connection
#[derive(Debug)]
pub struct OutboundEvent {
    /// Target connection
    pub to: ConnectionId,
    /// The event to deliver
    pub event: ServerEvent,
}

/// Successful reply to an inbound message
#[derive(Debug)]
pub enum DispatchReply {
    /// Join accepted; carries the roster snapshot
    Joined(JoinReply),
    /// Message processed; nothing to report
    Ack,
}

/// Everything one inbound message produced
#[derive(Debug)]
pub struct DispatchOutcome {
    /// Reply for the sender; rejections land here as `Err`
    pub reply: Result<DispatchReply>,
    /// Events for other connections, in delivery order
    pub events: Vec<OutboundEvent>,
    /// Connections the transport must close after delivering events
    pub hangups: Vec<ConnectionId>,
}

impl DispatchOutcome {
    fn ack() -> Self {
        Self {
            reply: Ok(DispatchReply::Ack),
            events: Vec::new(),
            hangups: Vec::new(),
        }
    }

    fn reject(error: Error) -> Self {
        Self {
            reply: Err(error),
            events: Vec::new(),
            hangups: Vec::new(),
        }
    }
}

/// Process-wide mapping from session token to connected participants
///
/// Pure in-memory state scoped to the relay process's lifetime. Sessions
/// are created lazily on first join and discarded when the last
/// participant leaves or a tutor ends the session.
pub struct SessionRegistry {
    roles: Arc<dyn RoleDirectory>,
    sessions: HashMap<String, Session>,
    /// Which session each connection belongs to; a handle is a member of
    /// at most one session at a time
    membership: HashMap<ConnectionId, String>,
}

impl SessionRegistry {
    /// Create a registry backed by the given role directory
    pub fn new(roles: Arc<dyn RoleDirectory>) -> Self {
        Self {
            roles,
            sessions: HashMap::new(),
            membership: HashMap::new(),
        }
    }

    /// Dispatch one inbound message from a connection
    pub fn apply(&mut self, from: ConnectionId, message: ClientMessage) -> DispatchOutcome {
        debug!(conn = %from, kind = message.name(), "Dispatching message");
        match message {
            ClientMessage::Join { token, user_id } => self.join(from, token, user_id),
            ClientMessage::Leave { .. } => self.leave(from),
            ClientMessage::Offer { token, to, sdp } => {
                self.relay(from, &token, to, |from| ServerEvent::Offer { from, sdp })
            }
            ClientMessage::Answer { token, to, sdp } => {
                self.relay(from, &token, to, |from| ServerEvent::Answer { from, sdp })
            }
            ClientMessage::IceCandidate {
                token,
                to,
                candidate,
            } => self.relay(from, &token, to, |from| ServerEvent::IceCandidate {
                from,
                candidate,
            }),
            ClientMessage::Control {
                token,
                command,
                target_user_id,
            } => self.control(from, &token, command, &target_user_id),
            ClientMessage::EndSession { token } => self.end_session(from, &token),
        }
    }

    /// Transport-triggered removal, invoked when a connection drops
    /// without an explicit leave. Keeps presence correct on network
    /// failure, browser crash, or tab close.
    pub fn disconnect(&mut self, conn: ConnectionId) -> DispatchOutcome {
        self.leave(conn)
    }

    /// Read-only roster snapshot for a token
    pub fn roster(&self, token: &str) -> Option<Vec<Participant>> {
        self.sessions
            .get(token)
            .map(|session| session.participants().to_vec())
    }

    /// Number of live sessions
    pub fn session_count(&self) -> usize {
        self.sessions.len()
    }

    fn join(&mut self, from: ConnectionId, token: String, user_id: String) -> DispatchOutcome {
        if let Err(e) = validate_session_token(&token) {
            warn!(conn = %from, error = %e, "Rejecting join with invalid token");
            return DispatchOutcome::reject(e.into());
        }

        let Some(role) = self.roles.role_for(&token, &user_id) else {
            warn!(conn = %from, token = %token, user = %user_id, "Join not covered by any booking");
            return DispatchOutcome::reject(Error::NotAuthorized { user_id });
        };

        let mut events = Vec::new();

        // A handle is a member of at most one session; a re-join counts
        // as leaving the previous session first.
        if self.membership.contains_key(&from) {
            events.extend(self.leave_connection(from));
        }

        let session = self
            .sessions
            .entry(token.clone())
            .or_insert_with(|| {
                info!(token = %token, "Session created");
                Session::new(token.clone())
            });

        let roster = session.roster_excluding(from);
        session.insert(from, user_id.clone(), role);

        for to in session.connections_except(from) {
            events.push(OutboundEvent {
                to,
                event: ServerEvent::ParticipantJoined {
                    connection_id: from,
                    user_id: user_id.clone(),
                    role,
                },
            });
        }

        self.membership.insert(from, token.clone());

        info!(
            token = %token,
            conn = %from,
            user = %user_id,
            role = %role,
            participants = roster.len() + 1,
            "Participant joined"
        );

        DispatchOutcome {
            reply: Ok(DispatchReply::Joined(JoinReply {
                connection_id: from,
                participants: roster,
            })),
            events,
            hangups: Vec::new(),
        }
    }

    fn leave(&mut self, conn: ConnectionId) -> DispatchOutcome {
        let events = self.leave_connection(conn);
        DispatchOutcome {
            reply: Ok(DispatchReply::Ack),
            events,
            hangups: Vec::new(),
        }
    }

    /// Remove a connection from whichever session it belongs to and
    /// broadcast its departure. Idempotent: unknown handles produce no
    /// events and no error.
    fn leave_connection(&mut self, conn: ConnectionId) -> Vec<OutboundEvent> {
        let Some(token) = self.membership.remove(&conn) else {
            debug!(conn = %conn, "Leave for unknown connection, ignoring");
            return Vec::new();
        };

        let Some(session) = self.sessions.get_mut(&token) else {
            return Vec::new();
        };

        let departed = session.remove(conn);
        let events = session
            .connections_except(conn)
            .into_iter()
            .map(|to| OutboundEvent {
                to,
                event: ServerEvent::ParticipantLeft {
                    connection_id: conn,
                },
            })
            .collect();

        if let Some(departed) = departed {
            info!(
                token = %token,
                conn = %conn,
                user = %departed.user_id,
                "Participant left"
            );
        }

        if session.is_empty() {
            self.sessions.remove(&token);
            info!(token = %token, "Session discarded (empty)");
        }

        events
    }

    /// Forward an opaque negotiation payload to one named member.
    ///
    /// The payload is never inspected. A target that already left is a
    /// silent drop: its departure was broadcast, the sender will
    /// renegotiate or give up on its own.
    fn relay<F>(
        &mut self,
        from: ConnectionId,
        token: &str,
        to: ConnectionId,
        build: F,
    ) -> DispatchOutcome
    where
        F: FnOnce(ConnectionId) -> ServerEvent,
    {
        if self.membership.get(&from).map(String::as_str) != Some(token) {
            warn!(conn = %from, token = %token, "Relay from non-member rejected");
            return DispatchOutcome::reject(Error::NotASessionMember);
        }

        let Some(session) = self.sessions.get(token) else {
            return DispatchOutcome::reject(Error::NotASessionMember);
        };

        if !session.contains_connection(to) {
            debug!(conn = %from, target = %to, "Relay target departed, dropping");
            return DispatchOutcome::ack();
        }

        let event = build(from);
        debug!(conn = %from, target = %to, kind = event.name(), "Relaying payload");

        DispatchOutcome {
            reply: Ok(DispatchReply::Ack),
            events: vec![OutboundEvent { to, event }],
            hangups: Vec::new(),
        }
    }

    /// Apply a tutor-issued control command to its target.
    ///
    /// Authorization failures are rejected at this boundary and never
    /// reach the target. Targets are addressed by stable user id, so a
    /// command stays valid across the target's reconnect.
    fn control(
        &mut self,
        from: ConnectionId,
        token: &str,
        command: ControlCommand,
        target_user_id: &str,
    ) -> DispatchOutcome {
        if self.membership.get(&from).map(String::as_str) != Some(token) {
            return DispatchOutcome::reject(Error::NotASessionMember);
        }

        let Some(session) = self.sessions.get_mut(token) else {
            return DispatchOutcome::reject(Error::NotASessionMember);
        };

        let Some(sender) = session.by_connection(from) else {
            return DispatchOutcome::reject(Error::NotASessionMember);
        };

        if !sender.role.is_tutor() {
            warn!(
                conn = %from,
                command = command.name(),
                "Control command from non-tutor rejected"
            );
            return DispatchOutcome::reject(Error::CommandNotPermitted);
        }

        let Some(target) = session.authoritative_mut(target_user_id) else {
            return DispatchOutcome::reject(Error::TargetNotInSession {
                target_user_id: target_user_id.to_string(),
            });
        };

        let target_conn = target.connection_id;
        let effect = match command {
            ControlCommand::MuteAudio => {
                target.media.audio_muted = true;
                ServerEvent::AudioMuted
            }
            ControlCommand::UnmuteAudio => {
                target.media.audio_muted = false;
                ServerEvent::AudioUnmuted
            }
            ControlCommand::MuteVideo => {
                target.media.video_muted = true;
                ServerEvent::VideoMuted
            }
            ControlCommand::UnmuteVideo => {
                target.media.video_muted = false;
                ServerEvent::VideoUnmuted
            }
            ControlCommand::Approve => {
                if target.role.is_tutor() {
                    return DispatchOutcome::reject(Error::ApproveTargetIsTutor);
                }
                target.media.approved = true;
                ServerEvent::Approved
            }
            ControlCommand::Remove => {
                info!(
                    token = %token,
                    target = %target_user_id,
                    "Removing participant by tutor command"
                );
                let mut events = vec![OutboundEvent {
                    to: target_conn,
                    event: ServerEvent::Removed,
                }];
                events.extend(self.leave_connection(target_conn));
                return DispatchOutcome {
                    reply: Ok(DispatchReply::Ack),
                    events,
                    hangups: vec![target_conn],
                };
            }
        };

        info!(
            token = %token,
            command = command.name(),
            target = %target_user_id,
            "Control command applied"
        );

        DispatchOutcome {
            reply: Ok(DispatchReply::Ack),
            events: vec![OutboundEvent {
                to: target_conn,
                event: effect,
            }],
            hangups: Vec::new(),
        }
    }

    /// Tear the whole session down on a tutor's order: every other
    /// participant gets exactly one termination notice, then the session
    /// entry is discarded.
    fn end_session(&mut self, from: ConnectionId, token: &str) -> DispatchOutcome {
        if self.membership.get(&from).map(String::as_str) != Some(token) {
            return DispatchOutcome::reject(Error::NotASessionMember);
        }

        let is_tutor = self
            .sessions
            .get(token)
            .and_then(|s| s.by_connection(from))
            .map(|p| p.role.is_tutor())
            .unwrap_or(false);
        if !is_tutor {
            warn!(conn = %from, token = %token, "End-session from non-tutor rejected");
            return DispatchOutcome::reject(Error::CommandNotPermitted);
        }

        let Some(mut session) = self.sessions.remove(token) else {
            return DispatchOutcome::reject(Error::NotASessionMember);
        };
        session.state = SessionState::Ended;

        let mut events = Vec::new();
        let mut hangups = Vec::new();
        for participant in session.participants() {
            self.membership.remove(&participant.connection_id);
            if participant.connection_id != from {
                events.push(OutboundEvent {
                    to: participant.connection_id,
                    event: ServerEvent::SessionEnded,
                });
                hangups.push(participant.connection_id);
            }
        }

        info!(
            token = %token,
            notified = events.len(),
            "Session ended by tutor"
        );

        DispatchOutcome {
            reply: Ok(DispatchReply::Ack),
            events,
            hangups,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::StaticRoleDirectory;
    use crate::protocol::IceCandidate;
    use crate::session::Role;

    const TOKEN: &str = "t1";

    fn registry() -> SessionRegistry {
        let mut roles = StaticRoleDirectory::new();
        roles.insert(TOKEN, "alice", Role::Tutor);
        roles.insert(TOKEN, "bob", Role::Student);
        roles.insert(TOKEN, "carol", Role::Student);
        SessionRegistry::new(Arc::new(roles))
    }

    fn join(reg: &mut SessionRegistry, conn: ConnectionId, user: &str) -> DispatchOutcome {
        reg.apply(
            conn,
            ClientMessage::Join {
                token: TOKEN.into(),
                user_id: user.into(),
            },
        )
    }

    fn joined_roster(outcome: DispatchOutcome) -> Vec<Participant> {
        match outcome.reply {
            Ok(DispatchReply::Joined(reply)) => reply.participants,
            other => panic!("expected join reply, got {:?}", other),
        }
    }

    fn control(
        reg: &mut SessionRegistry,
        conn: ConnectionId,
        command: ControlCommand,
        target: &str,
    ) -> DispatchOutcome {
        reg.apply(
            conn,
            ClientMessage::Control {
                token: TOKEN.into(),
                command,
                target_user_id: target.into(),
            },
        )
    }

    fn media_of(reg: &SessionRegistry, user: &str) -> crate::session::MediaState {
        reg.roster(TOKEN)
            .unwrap()
            .into_iter()
            .rev()
            .find(|p| p.user_id == user)
            .unwrap()
            .media
    }

    #[test]
    fn test_roster_tracks_joins_and_leaves() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();

        assert!(joined_roster(join(&mut reg, a, "alice")).is_empty());

        let roster = joined_roster(join(&mut reg, b, "bob"));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].connection_id, a);

        reg.apply(b, ClientMessage::Leave { token: TOKEN.into() });

        let roster = joined_roster(join(&mut reg, c, "carol"));
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, "alice");
    }

    #[test]
    fn test_leave_without_join_is_noop() {
        let mut reg = registry();
        let ghost = ConnectionId::new();

        let outcome = reg.apply(ghost, ClientMessage::Leave { token: TOKEN.into() });
        assert!(matches!(outcome.reply, Ok(DispatchReply::Ack)));
        assert!(outcome.events.is_empty());

        let outcome = reg.disconnect(ghost);
        assert!(outcome.events.is_empty());
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn test_join_broadcasts_presence() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");

        let outcome = join(&mut reg, b, "bob");
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].to, a);
        match &outcome.events[0].event {
            ServerEvent::ParticipantJoined {
                connection_id,
                user_id,
                role,
            } => {
                assert_eq!(*connection_id, b);
                assert_eq!(user_id, "bob");
                assert_eq!(*role, Role::Student);
            }
            other => panic!("expected ParticipantJoined, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_token_rejected_without_state_change() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let outcome = reg.apply(
            a,
            ClientMessage::Join {
                token: "bad token!".into(),
                user_id: "alice".into(),
            },
        );
        assert!(matches!(outcome.reply, Err(Error::InvalidToken(_))));
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn test_unbooked_user_rejected() {
        let mut reg = registry();
        let outcome = join(&mut reg, ConnectionId::new(), "mallory");
        assert!(matches!(outcome.reply, Err(Error::NotAuthorized { .. })));
        assert_eq!(reg.session_count(), 0);
    }

    #[test]
    fn test_relay_requires_membership() {
        let mut reg = registry();
        let a = ConnectionId::new();
        join(&mut reg, a, "alice");

        let outsider = ConnectionId::new();
        let outcome = reg.apply(
            outsider,
            ClientMessage::Offer {
                token: TOKEN.into(),
                to: a,
                sdp: "v=0".into(),
            },
        );
        assert!(matches!(outcome.reply, Err(Error::NotASessionMember)));
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_relay_to_departed_handle_is_silent_drop() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");
        reg.apply(b, ClientMessage::Leave { token: TOKEN.into() });

        let outcome = reg.apply(
            a,
            ClientMessage::Offer {
                token: TOKEN.into(),
                to: b,
                sdp: "v=0".into(),
            },
        );
        assert!(matches!(outcome.reply, Ok(DispatchReply::Ack)));
        assert!(outcome.events.is_empty());
    }

    #[test]
    fn test_relay_forwards_payload_verbatim() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");

        let sdp = "v=0\r\no=- 4611731400430051336 2 IN IP4 127.0.0.1\r\nm=audio 9 UDP/TLS/RTP/SAVPF 111";
        let outcome = reg.apply(
            a,
            ClientMessage::Offer {
                token: TOKEN.into(),
                to: b,
                sdp: sdp.into(),
            },
        );
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].to, b);
        match &outcome.events[0].event {
            ServerEvent::Offer { from, sdp: relayed } => {
                assert_eq!(*from, a);
                assert_eq!(relayed, sdp);
            }
            other => panic!("expected Offer, got {:?}", other),
        }

        let candidate = IceCandidate {
            candidate: "candidate:1 1 UDP 2122252543 192.0.2.1 54321 typ host".into(),
            sdp_mid: Some("0".into()),
            sdp_m_line_index: Some(0),
        };
        let outcome = reg.apply(
            b,
            ClientMessage::IceCandidate {
                token: TOKEN.into(),
                to: a,
                candidate: candidate.clone(),
            },
        );
        match &outcome.events[0].event {
            ServerEvent::IceCandidate {
                from,
                candidate: relayed,
            } => {
                assert_eq!(*from, b);
                assert_eq!(relayed, &candidate);
            }
            other => panic!("expected IceCandidate, got {:?}", other),
        }
    }

    #[test]
    fn test_non_tutor_command_never_reaches_target() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");

        let outcome = control(&mut reg, b, ControlCommand::MuteAudio, "alice");
        assert!(matches!(outcome.reply, Err(Error::CommandNotPermitted)));
        assert!(outcome.events.is_empty());
        assert!(!media_of(&reg, "alice").audio_muted);
    }

    #[test]
    fn test_mute_unmute_restores_state() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");

        let outcome = control(&mut reg, a, ControlCommand::MuteAudio, "bob");
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].to, b);
        assert!(matches!(outcome.events[0].event, ServerEvent::AudioMuted));
        assert!(media_of(&reg, "bob").audio_muted);

        // Repeated mutes are idempotent
        control(&mut reg, a, ControlCommand::MuteAudio, "bob");
        assert!(media_of(&reg, "bob").audio_muted);

        control(&mut reg, a, ControlCommand::UnmuteAudio, "bob");
        assert!(!media_of(&reg, "bob").audio_muted);

        control(&mut reg, a, ControlCommand::MuteVideo, "bob");
        assert!(media_of(&reg, "bob").video_muted);
        control(&mut reg, a, ControlCommand::UnmuteVideo, "bob");
        assert!(!media_of(&reg, "bob").video_muted);
    }

    #[test]
    fn test_approve_only_non_tutor_targets() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");

        assert!(!media_of(&reg, "bob").approved);
        let outcome = control(&mut reg, a, ControlCommand::Approve, "bob");
        assert!(matches!(outcome.events[0].event, ServerEvent::Approved));
        assert!(media_of(&reg, "bob").approved);

        // Idempotent on an already-approved target
        let outcome = control(&mut reg, a, ControlCommand::Approve, "bob");
        assert!(matches!(outcome.reply, Ok(DispatchReply::Ack)));
        assert!(media_of(&reg, "bob").approved);

        // A tutor target is rejected
        let outcome = control(&mut reg, a, ControlCommand::Approve, "alice");
        assert!(matches!(outcome.reply, Err(Error::ApproveTargetIsTutor)));
    }

    #[test]
    fn test_command_against_absent_target_rejected() {
        let mut reg = registry();
        let a = ConnectionId::new();
        join(&mut reg, a, "alice");

        let outcome = control(&mut reg, a, ControlCommand::MuteAudio, "bob");
        assert!(matches!(
            outcome.reply,
            Err(Error::TargetNotInSession { .. })
        ));
    }

    #[test]
    fn test_remove_tears_down_target() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");
        join(&mut reg, c, "carol");

        let outcome = control(&mut reg, a, ControlCommand::Remove, "bob");
        assert!(matches!(outcome.reply, Ok(DispatchReply::Ack)));
        assert_eq!(outcome.hangups, vec![b]);

        // Target gets Removed first, remaining members get the departure
        assert_eq!(outcome.events[0].to, b);
        assert!(matches!(outcome.events[0].event, ServerEvent::Removed));
        let left_targets: Vec<_> = outcome.events[1..]
            .iter()
            .map(|e| {
                assert!(matches!(e.event, ServerEvent::ParticipantLeft { .. }));
                e.to
            })
            .collect();
        assert!(left_targets.contains(&a));
        assert!(left_targets.contains(&c));

        let roster = reg.roster(TOKEN).unwrap();
        assert!(roster.iter().all(|p| p.user_id != "bob"));
    }

    #[test]
    fn test_end_session_notifies_once_and_discards() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        let c = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");
        join(&mut reg, c, "carol");

        let outcome = reg.apply(a, ClientMessage::EndSession { token: TOKEN.into() });
        assert!(matches!(outcome.reply, Ok(DispatchReply::Ack)));

        let ended: Vec<_> = outcome
            .events
            .iter()
            .map(|e| {
                assert!(matches!(e.event, ServerEvent::SessionEnded));
                e.to
            })
            .collect();
        assert_eq!(ended.len(), 2);
        assert!(ended.contains(&b) && ended.contains(&c));
        assert!(outcome.hangups.contains(&b) && outcome.hangups.contains(&c));
        assert!(!outcome.hangups.contains(&a));

        assert!(reg.roster(TOKEN).is_none());
        assert_eq!(reg.session_count(), 0);

        // A second end-session references an untracked token
        let outcome = reg.apply(a, ClientMessage::EndSession { token: TOKEN.into() });
        assert!(matches!(outcome.reply, Err(Error::NotASessionMember)));
    }

    #[test]
    fn test_end_session_by_student_rejected() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b, "bob");

        let outcome = reg.apply(b, ClientMessage::EndSession { token: TOKEN.into() });
        assert!(matches!(outcome.reply, Err(Error::CommandNotPermitted)));
        assert_eq!(reg.session_count(), 1);
    }

    #[test]
    fn test_reconnect_carries_media_state_by_user() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b1 = ConnectionId::new();
        join(&mut reg, a, "alice");
        join(&mut reg, b1, "bob");
        control(&mut reg, a, ControlCommand::MuteAudio, "bob");

        // Bob reconnects under a fresh handle before the old one drops
        let b2 = ConnectionId::new();
        join(&mut reg, b2, "bob");
        assert!(media_of(&reg, "bob").audio_muted);

        // Commands now land on the new handle
        let outcome = control(&mut reg, a, ControlCommand::UnmuteAudio, "bob");
        assert_eq!(outcome.events[0].to, b2);
        assert!(!media_of(&reg, "bob").audio_muted);
    }

    #[test]
    fn test_full_two_party_scenario() {
        let mut reg = registry();
        let a = ConnectionId::new();
        let b = ConnectionId::new();

        // Tutor joins an empty session
        assert!(joined_roster(join(&mut reg, a, "alice")).is_empty());

        // Student joins: tutor is notified, student sees the tutor
        let outcome = join(&mut reg, b, "bob");
        let roster = match &outcome.reply {
            Ok(DispatchReply::Joined(reply)) => &reply.participants,
            other => panic!("expected join reply, got {:?}", other),
        };
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].connection_id, a);

        // Offer relays verbatim
        let outcome = reg.apply(
            a,
            ClientMessage::Offer {
                token: TOKEN.into(),
                to: b,
                sdp: "v=0".into(),
            },
        );
        assert!(matches!(
            outcome.events[0].event,
            ServerEvent::Offer { .. }
        ));

        // Mute, then unmute
        control(&mut reg, a, ControlCommand::MuteAudio, "bob");
        assert!(media_of(&reg, "bob").audio_muted);
        control(&mut reg, a, ControlCommand::UnmuteAudio, "bob");
        assert!(!media_of(&reg, "bob").audio_muted);

        // End the lesson
        let outcome = reg.apply(a, ClientMessage::EndSession { token: TOKEN.into() });
        assert_eq!(outcome.events.len(), 1);
        assert_eq!(outcome.events[0].to, b);
        assert!(matches!(outcome.events[0].event, ServerEvent::SessionEnded));
        assert!(reg.roster(TOKEN).is_none());
    }
}
