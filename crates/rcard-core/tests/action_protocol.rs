//! Integration tests for the rcard-core public API.
//!
//! These walk a request the way the gateway does: decode the JSON frame,
//! resolve the action and the connection key, parse and normalize the APDU,
//! then fold a card answer into the response object.

use rcard_core::apdu::command::decode_hex;
use rcard_core::{
    normalize, ActionKind, ActionRequest, ActionResponse, ApduFixups, CardType, CommandApdu,
    ConnectionKey, GatewayError, ResponseApdu,
};
use serde_json::json;

#[test]
fn test_send_request_flows_to_normalized_bytes() {
    // Arrange
    let req = ActionRequest::from_json(r#"{"action":"send","target":"sim","apdu":"00 A4 04 00"}"#)
        .unwrap();

    // Act
    let kind = req.kind().unwrap();
    let card_type: CardType = req.target.as_deref().unwrap_or("card").parse().unwrap();
    let cmd = CommandApdu::from_hex(req.apdu.as_deref().unwrap()).unwrap();
    let wire = normalize(&cmd, &ApduFixups::default()).to_bytes();

    // Assert
    assert_eq!(kind, ActionKind::Send);
    assert_eq!(card_type, CardType::Simulated);
    assert_eq!(wire, vec![0x00, 0xA4, 0x04, 0x00, 0x00]);
}

#[test]
fn test_select_request_builds_select_command() {
    let req = ActionRequest::from_json(r#"{"action":"select","aid":"A000000003000000"}"#).unwrap();
    let aid = decode_hex(req.aid.as_deref().unwrap()).unwrap();
    let cmd = normalize(&CommandApdu::select(&aid).unwrap(), &ApduFixups::default());
    assert_eq!(hex::encode_upper(cmd.to_bytes()), "00A4040008A000000003000000");
}

#[test]
fn test_simulated_key_with_token_differs_from_shared_key() {
    let with_token = ConnectionKey::new(CardType::Simulated, 0, Some("abc")).unwrap();
    let shared = ConnectionKey::new(CardType::Simulated, 0, None).unwrap();
    assert_ne!(with_token, shared);
}

#[test]
fn test_physical_key_with_token_is_validation_error() {
    let err = ConnectionKey::new(CardType::Physical, 0, Some("abc")).unwrap_err();
    assert!(matches!(err, GatewayError::Validation(_)));
}

#[test]
fn test_card_answer_is_reported_in_response_json() {
    // Arrange
    let answer = ResponseApdu::parse(&[0x01, 0x02, 0x6A, 0x82]).unwrap();

    // Act
    let resp = ActionResponse::new(3)
        .with_session("sess-1", Some(json!("rid-1")))
        .with_card_response(&answer);
    let value = serde_json::to_value(&resp).unwrap();

    // Assert
    assert_eq!(
        value,
        json!({
            "session": "sess-1",
            "rid": "rid-1",
            "result": 0,
            "num_connections": 3,
            "response": "01026A82",
            "sw": 0x6A82,
            "sw_hex": "6a82",
            "sw1": 0x6A,
            "sw2": 0x82,
        })
    );
}

#[test]
fn test_unknown_action_response_shape() {
    let req = ActionRequest::from_json(r#"{"action":"format_card"}"#).unwrap();
    let err = req.kind().unwrap_err();
    let value = serde_json::to_value(ActionResponse::new(0).fail(&err)).unwrap();
    assert_eq!(
        value,
        json!({"result": -1, "num_connections": 0, "error": "UnknownAction"})
    );
}
