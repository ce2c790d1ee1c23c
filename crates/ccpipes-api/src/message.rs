// ── Relay message envelopes ──
//
// Every frame is a JSON object with a `type` discriminator. Outbound frames
// are requests (`reqId` + body), inbound frames are confirmations, unsolicited
// factory diffs from the controller, or relay notices.

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::types::{
    Factory, Group, GroupEdits, GroupId, Machine, MachineEdits, MachineId, PeriphId, Pipe,
    PipeEdits, PipeId, RequestId,
};

/// Every message type name that can appear on the relay.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
pub enum MessageType {
    BatchRequest,
    ConfirmationResponse,
    IdleTimeout,
    SessionCreate,
    SessionJoin,
    SessionRejoin,
    FactoryGet,
    FactoryGetResponse,
    PipeAdd,
    PipeEdit,
    PipeDel,
    MachineAdd,
    MachineEdit,
    MachineDel,
    GroupAdd,
    GroupEdit,
    GroupDel,
    PeriphAdd,
    PeriphDel,
    CcUpdatedFactory,
}

/// Request types that mutate the factory on the controller.
pub const FACTORY_UPDATE_REQUEST_TYPES: [MessageType; 11] = [
    MessageType::PipeAdd,
    MessageType::PipeEdit,
    MessageType::PipeDel,
    MessageType::MachineAdd,
    MessageType::MachineEdit,
    MessageType::MachineDel,
    MessageType::GroupAdd,
    MessageType::GroupEdit,
    MessageType::GroupDel,
    MessageType::PeriphAdd,
    MessageType::PeriphDel,
];

impl MessageType {
    pub fn is_factory_update(self) -> bool {
        FACTORY_UPDATE_REQUEST_TYPES.contains(&self)
    }
}

/// A structural delta against the previous factory snapshot.
///
/// Opaque at this layer; `ccpipes-core` knows how to apply it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Patch(pub serde_json::Value);

impl Patch {
    pub fn as_value(&self) -> &serde_json::Value {
        &self.0
    }

    pub fn into_value(self) -> serde_json::Value {
        self.0
    }
}

impl From<serde_json::Value> for Patch {
    fn from(value: serde_json::Value) -> Self {
        Self(value)
    }
}

// ── Outbound ────────────────────────────────────────────────────────

/// An outbound request: a correlation ID plus a typed body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    #[serde(rename = "reqId")]
    pub req_id: RequestId,
    #[serde(flatten)]
    pub body: RequestBody,
}

impl Request {
    /// Wrap `body` with a freshly generated request ID.
    pub fn new(body: RequestBody) -> Self {
        Self {
            req_id: RequestId::generate(),
            body,
        }
    }

    /// Wrap several bodies into a single `BatchRequest`, each member with
    /// its own request ID.
    pub fn batch(bodies: impl IntoIterator<Item = RequestBody>) -> Self {
        Self::new(RequestBody::Batch {
            requests: bodies.into_iter().map(Self::new).collect(),
        })
    }

    /// Package bodies for sending as one unit: nothing for an empty list,
    /// the request itself for one, a `BatchRequest` for two or more.
    pub fn bundle(bodies: Vec<RequestBody>) -> Option<Self> {
        if bodies.len() > 1 {
            return Some(Self::batch(bodies));
        }
        bodies.into_iter().next().map(Self::new)
    }

    pub fn message_type(&self) -> MessageType {
        self.body.message_type()
    }
}

/// Request payloads, tagged by `type` on the wire.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum RequestBody {
    #[serde(rename_all = "camelCase")]
    PipeAdd { pipe: Pipe },
    #[serde(rename_all = "camelCase")]
    PipeEdit { pipe_id: PipeId, edits: PipeEdits },
    #[serde(rename_all = "camelCase")]
    PipeDel { pipe_id: PipeId },
    #[serde(rename_all = "camelCase")]
    MachineAdd { machine: Machine },
    #[serde(rename_all = "camelCase")]
    MachineEdit {
        machine_id: MachineId,
        edits: MachineEdits,
    },
    #[serde(rename_all = "camelCase")]
    MachineDel { machine_id: MachineId },
    #[serde(rename_all = "camelCase")]
    GroupAdd { group: Group, machine_id: MachineId },
    #[serde(rename_all = "camelCase")]
    GroupEdit { group_id: GroupId, edits: GroupEdits },
    #[serde(rename_all = "camelCase")]
    GroupDel { group_id: GroupId },
    #[serde(rename_all = "camelCase")]
    PeriphAdd {
        periph_id: PeriphId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        options: Option<MachineEdits>,
    },
    #[serde(rename_all = "camelCase")]
    PeriphDel { periph_id: PeriphId },
    /// Requests the controller executes in order, as a unit.
    #[serde(rename = "BatchRequest")]
    Batch { requests: Vec<Request> },
    FactoryGet {},
    #[serde(rename_all = "camelCase")]
    SessionJoin { session_id: String },
}

impl RequestBody {
    pub fn message_type(&self) -> MessageType {
        match self {
            Self::PipeAdd { .. } => MessageType::PipeAdd,
            Self::PipeEdit { .. } => MessageType::PipeEdit,
            Self::PipeDel { .. } => MessageType::PipeDel,
            Self::MachineAdd { .. } => MessageType::MachineAdd,
            Self::MachineEdit { .. } => MessageType::MachineEdit,
            Self::MachineDel { .. } => MessageType::MachineDel,
            Self::GroupAdd { .. } => MessageType::GroupAdd,
            Self::GroupEdit { .. } => MessageType::GroupEdit,
            Self::GroupDel { .. } => MessageType::GroupDel,
            Self::PeriphAdd { .. } => MessageType::PeriphAdd,
            Self::PeriphDel { .. } => MessageType::PeriphDel,
            Self::Batch { .. } => MessageType::BatchRequest,
            Self::FactoryGet {} => MessageType::FactoryGet,
            Self::SessionJoin { .. } => MessageType::SessionJoin,
        }
    }
}

// ── Inbound ─────────────────────────────────────────────────────────

/// Messages the editor receives from the relay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    ConfirmationResponse(Confirmation),
    /// Unilateral factory change from the controller (peripherals attached
    /// or detached).
    CcUpdatedFactory { diff: Vec<Patch> },
    /// The relay is about to close an idle session.
    IdleTimeout { message: String },
}

/// Response to a request, relayed from the controller or the relay itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation {
    pub responding_to: MessageType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub req_id: Option<RequestId>,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diff: Option<Vec<Patch>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub factory: Option<Factory>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// What a confirmation means for the local snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfirmationOutcome {
    /// Full factory (response to `FactoryGet`).
    Snapshot(Factory),
    /// Ordered patches against the current snapshot.
    Diff(Vec<Patch>),
    /// Success with nothing to apply.
    Ack,
    /// The request failed; nothing was changed.
    Rejected { error: String, message: String },
}

impl Confirmation {
    pub fn success(responding_to: MessageType, req_id: Option<RequestId>) -> Self {
        Self {
            responding_to,
            req_id,
            ok: true,
            diff: None,
            factory: None,
            error: None,
            message: None,
        }
    }

    pub fn failure(
        responding_to: MessageType,
        req_id: Option<RequestId>,
        error: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            ok: false,
            error: Some(error.into()),
            message: Some(message.into()),
            ..Self::success(responding_to, req_id)
        }
    }

    pub fn with_diff(mut self, diff: Vec<Patch>) -> Self {
        self.diff = Some(diff);
        self
    }

    pub fn with_factory(mut self, factory: Factory) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn into_outcome(self) -> ConfirmationOutcome {
        if !self.ok {
            return ConfirmationOutcome::Rejected {
                error: self.error.unwrap_or_else(|| "Unknown".into()),
                message: self.message.unwrap_or_default(),
            };
        }
        if let Some(factory) = self.factory {
            return ConfirmationOutcome::Snapshot(factory);
        }
        match self.diff {
            Some(diff) => ConfirmationOutcome::Diff(diff),
            None => ConfirmationOutcome::Ack,
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::types::Slot;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn message_type_round_trips_through_strings() {
        assert_eq!(MessageType::CcUpdatedFactory.to_string(), "CcUpdatedFactory");
        assert_eq!(
            "GroupEdit".parse::<MessageType>().unwrap(),
            MessageType::GroupEdit
        );
        assert!("Nonsense".parse::<MessageType>().is_err());
    }

    #[test]
    fn factory_update_types() {
        assert!(MessageType::PeriphDel.is_factory_update());
        assert!(!MessageType::FactoryGet.is_factory_update());
        assert!(!MessageType::BatchRequest.is_factory_update());
    }

    #[test]
    fn group_edit_serializes_camel_case() {
        let req = Request {
            req_id: RequestId::from("r1"),
            body: RequestBody::GroupEdit {
                group_id: GroupId::from("g1"),
                edits: GroupEdits {
                    slots: Some(vec![Slot::new("p1", 0)]),
                    ..GroupEdits::default()
                },
            },
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "reqId": "r1",
                "type": "GroupEdit",
                "groupId": "g1",
                "edits": { "slots": [{ "periphId": "p1", "slot": 0 }] }
            })
        );
    }

    #[test]
    fn batch_request_nests_members() {
        let req = Request {
            req_id: RequestId::from("batch"),
            body: RequestBody::Batch {
                requests: vec![Request {
                    req_id: RequestId::from("m"),
                    body: RequestBody::MachineDel {
                        machine_id: MachineId::from("m2"),
                    },
                }],
            },
        };
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value["type"], "BatchRequest");
        assert_eq!(value["requests"][0]["type"], "MachineDel");
        assert_eq!(value["requests"][0]["machineId"], "m2");

        let back: Request = serde_json::from_value(value).unwrap();
        assert_eq!(back, req);
    }

    #[test]
    fn factory_get_has_only_type_and_id() {
        let req = Request {
            req_id: RequestId::from("r9"),
            body: RequestBody::FactoryGet {},
        };
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({ "reqId": "r9", "type": "FactoryGet" })
        );
    }

    #[test]
    fn bundle_sends_single_requests_bare() {
        assert_eq!(Request::bundle(Vec::new()), None);

        let single = Request::bundle(vec![RequestBody::PipeDel { pipe_id: PipeId::from("a") }]);
        assert_eq!(single.map(|r| r.message_type()), Some(MessageType::PipeDel));

        let pair = Request::bundle(vec![
            RequestBody::PipeDel { pipe_id: PipeId::from("a") },
            RequestBody::PipeDel { pipe_id: PipeId::from("b") },
        ]);
        assert_eq!(pair.map(|r| r.message_type()), Some(MessageType::BatchRequest));
    }

    #[test]
    fn request_batch_assigns_distinct_ids() {
        let req = Request::batch([
            RequestBody::PipeDel { pipe_id: PipeId::from("a") },
            RequestBody::PipeDel { pipe_id: PipeId::from("b") },
        ]);
        let RequestBody::Batch { requests } = &req.body else {
            panic!("expected batch");
        };
        assert_eq!(requests.len(), 2);
        assert_ne!(requests[0].req_id, requests[1].req_id);
        assert_eq!(req.message_type(), MessageType::BatchRequest);
    }

    #[test]
    fn decode_failed_confirmation() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "ConfirmationResponse",
            "respondingTo": "MachineEdit",
            "reqId": "abc",
            "ok": false,
            "error": "MachineNotFound",
            "message": "no machine m9"
        }))
        .unwrap();

        let ServerMessage::ConfirmationResponse(conf) = msg else {
            panic!("expected confirmation");
        };
        assert_eq!(conf.req_id, Some(RequestId::from("abc")));
        assert_eq!(
            conf.into_outcome(),
            ConfirmationOutcome::Rejected {
                error: "MachineNotFound".into(),
                message: "no machine m9".into(),
            }
        );
    }

    #[test]
    fn decode_factory_get_response() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "ConfirmationResponse",
            "respondingTo": "FactoryGet",
            "reqId": "abc",
            "ok": true,
            "factory": { "pipes": {}, "machines": {}, "groups": {}, "missing": {}, "available": {} }
        }))
        .unwrap();
        let ServerMessage::ConfirmationResponse(conf) = msg else {
            panic!("expected confirmation");
        };
        assert_eq!(
            conf.into_outcome(),
            ConfirmationOutcome::Snapshot(Factory::default())
        );
    }

    #[test]
    fn decode_cc_updated_factory() {
        let msg: ServerMessage = serde_json::from_value(json!({
            "type": "CcUpdatedFactory",
            "diff": [{ "available": { "p7": [true] } }]
        }))
        .unwrap();
        assert_eq!(
            msg,
            ServerMessage::CcUpdatedFactory {
                diff: vec![Patch(json!({ "available": { "p7": [true] } }))],
            }
        );
    }

    #[test]
    fn success_without_payload_is_ack() {
        let conf = Confirmation::success(MessageType::SessionJoin, None);
        assert_eq!(conf.into_outcome(), ConfirmationOutcome::Ack);
    }
}
