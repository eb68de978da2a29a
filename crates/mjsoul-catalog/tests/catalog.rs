use mjsoul_catalog::{FieldType, ScalarType, SchemaError, ServiceCatalog};
use serde_json::json;

const LIQI: &str = r#"{
  "nested": {
    "lq": {
      "options": { "java_package": "lq" },
      "nested": {
        "Lobby": {
          "methods": {
            "heatbeat": { "requestType": "ReqHeatBeat", "responseType": "ResCommon" },
            "oauth2Login": { "requestType": "ReqOauth2Login", "responseType": "ResLogin" },
            "fetchRoom": { "requestType": "ReqCommon", "responseType": "ResSelfRoom" }
          }
        },
        "FastTest": {
          "methods": {
            "heatbeat": { "requestType": "ReqCommon", "responseType": "ResCommon" },
            "inputOperation": { "requestType": "ReqSelfOperation", "responseType": "ResCommon" }
          }
        },
        "Error": {
          "fields": {
            "code": { "type": "uint32", "id": 1 },
            "u32_params": { "rule": "repeated", "type": "uint32", "id": 2 },
            "str_params": { "rule": "repeated", "type": "string", "id": 3 },
            "json_param": { "type": "string", "id": 4 }
          }
        },
        "ReqCommon": { "fields": {} },
        "ResCommon": { "fields": { "error": { "type": "Error", "id": 1 } } },
        "ReqHeatBeat": { "fields": { "no_operation_counter": { "type": "uint32", "id": 1 } } },
        "ReqOauth2Login": {
          "fields": {
            "type": { "type": "uint32", "id": 1 },
            "access_token": { "type": "string", "id": 2 },
            "reconnect": { "type": "bool", "id": 3 }
          }
        },
        "ResLogin": {
          "fields": {
            "error": { "type": "Error", "id": 1 },
            "account_id": { "type": "uint32", "id": 2 },
            "account": { "type": "Account", "id": 3 }
          }
        },
        "Account": {
          "fields": {
            "account_id": { "type": "uint32", "id": 1 },
            "nickname": { "type": "string", "id": 2 }
          }
        },
        "ReqSelfOperation": {
          "fields": {
            "type": { "type": "uint32", "id": 1 },
            "index": { "type": "uint32", "id": 2 },
            "tile": { "type": "string", "id": 3 },
            "timeuse": { "type": "uint32", "id": 6 }
          }
        },
        "ResSelfRoom": {
          "fields": {
            "error": { "type": "Error", "id": 1 },
            "room": { "type": "Room", "id": 2 }
          }
        },
        "Room": {
          "fields": {
            "room_id": { "type": "uint32", "id": 1 },
            "persons": { "rule": "repeated", "type": "Room.Person", "id": 2 },
            "phase": { "type": "lq.RoomPhase", "id": 3 }
          },
          "nested": {
            "Person": {
              "fields": {
                "account_id": { "type": "uint32", "id": 1 },
                "nickname": { "type": "string", "id": 2 }
              }
            }
          }
        },
        "RoomPhase": { "values": { "waiting": 0, "ready": 1, "playing": 2 } },
        "NotifyRoomPlayerReady": {
          "fields": {
            "account_id": { "type": "uint32", "id": 1 },
            "ready": { "type": "bool", "id": 2 }
          }
        }
      }
    }
  }
}"#;

fn catalog() -> ServiceCatalog {
    ServiceCatalog::from_json(LIQI).unwrap()
}

#[test]
fn test_package_and_service_order() {
    let catalog = catalog();
    assert_eq!(catalog.package(), "lq");
    let names: Vec<_> = catalog.services().iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, ["Lobby", "FastTest"]);
}

#[test]
fn test_method_lookup_hit() {
    let catalog = catalog();
    let resolved = catalog.method_lookup("oauth2Login").unwrap();
    assert_eq!(resolved.request.name, "ReqOauth2Login");
    assert_eq!(resolved.response.name, "ResLogin");
    assert_eq!(resolved.wire_name(), ".lq.Lobby.oauth2Login");
}

#[test]
fn test_method_lookup_prefers_first_declared_service() {
    let catalog = catalog();
    let resolved = catalog.method_lookup("heatbeat").unwrap();
    assert_eq!(resolved.service.name, "Lobby");
    assert_eq!(resolved.request.name, "ReqHeatBeat");
}

#[test]
fn test_method_lookup_miss() {
    let err = catalog().method_lookup("logout").unwrap_err();
    assert!(matches!(err, SchemaError::MethodNotFound(_)));
}

#[test]
fn test_message_lookup_by_wire_name() {
    let catalog = catalog();
    let schema = catalog.message_lookup(".lq.NotifyRoomPlayerReady").unwrap();
    assert_eq!(schema.full_name, "lq.NotifyRoomPlayerReady");
    assert!(matches!(
        catalog.message_lookup(".lq.NotifyGone"),
        Err(SchemaError::MessageNotFound(_))
    ));
}

#[test]
fn test_nested_types_and_enum_references() {
    let catalog = catalog();
    let room = catalog.message_lookup("Room").unwrap();
    let persons = room.field("persons").unwrap();
    assert!(persons.repeated);
    assert_eq!(persons.ty, FieldType::Message("lq.Room.Person".into()));
    assert_eq!(room.field("phase").unwrap().ty, FieldType::Enum("lq.RoomPhase".into()));

    let person = catalog.message_lookup("Person").unwrap();
    assert_eq!(person.full_name, "lq.Room.Person");
    assert_eq!(catalog.enum_lookup("RoomPhase").unwrap().value_of("ready"), Some(1));
}

#[test]
fn test_field_order_follows_numbers() {
    let catalog = catalog();
    let schema = catalog.message_lookup("ReqSelfOperation").unwrap();
    let numbers: Vec<_> = schema.fields().iter().map(|f| f.number).collect();
    assert_eq!(numbers, [1, 2, 3, 6]);
    assert_eq!(
        schema.field("timeuse").unwrap().ty,
        FieldType::Scalar(ScalarType::Uint32)
    );
}

#[test]
fn test_request_encodes_against_resolved_schema() {
    let catalog = catalog();
    let resolved = catalog.method_lookup("oauth2Login").unwrap();
    let bytes = catalog
        .encode(
            resolved.request,
            &json!({"type": 7, "access_token": "ab", "reconnect": false}),
        )
        .unwrap();
    assert_eq!(bytes, [0x08, 0x07, 0x12, 0x02, b'a', b'b']);
}

#[test]
fn test_nested_response_decodes() {
    let catalog = catalog();
    let schema = catalog.method_lookup("fetchRoom").unwrap().response;
    let value = json!({
        "room": {
            "room_id": 9,
            "persons": [
                {"account_id": 1, "nickname": "east"},
                {"account_id": 2, "nickname": "south"}
            ],
            "phase": "playing"
        }
    });
    let bytes = catalog.encode(schema, &value).unwrap();
    let decoded = catalog.decode(schema, &bytes).unwrap();
    assert_eq!(decoded["room"]["phase"], json!(2));
    assert_eq!(decoded["room"]["persons"][1]["nickname"], json!("south"));
    assert!(decoded.get("error").is_none());
}

#[test]
fn test_error_payload_decodes() {
    let catalog = catalog();
    let schema = catalog.message_lookup("ResCommon").unwrap();
    let bytes = catalog
        .encode(schema, &json!({"error": {"code": 5, "str_params": ["a", "b"]}}))
        .unwrap();
    let decoded = catalog.decode(schema, &bytes).unwrap();
    assert_eq!(decoded, json!({"error": {"code": 5, "str_params": ["a", "b"]}}));
}

#[test]
fn test_unknown_request_field() {
    let catalog = catalog();
    let schema = catalog.method_lookup("heatbeat").unwrap().request;
    let err = catalog.encode(schema, &json!({"counter": 1})).unwrap_err();
    assert!(matches!(err, SchemaError::UnknownField { .. }));
}
