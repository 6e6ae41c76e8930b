//! JSON model of `type_description_interfaces/msg/TypeDescription`.
//!
//! Field order in these structs is the key order of the hashed JSON and must
//! not change.

use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::descriptor::{ElementType, FieldKind, ServiceDescriptor, TypeDescriptor};
use crate::type_id::TypeId;

/// Main type plus every transitively referenced type, sorted by name.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TypeDescriptionMsg {
    pub type_description: TypeDescription,
    pub referenced_type_descriptions: Vec<TypeDescription>,
}

/// `type_description_interfaces/msg/IndividualTypeDescription`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TypeDescription {
    pub type_name: String,
    pub fields: Vec<FieldDescription>,
}

/// `type_description_interfaces/msg/Field`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDescription {
    pub name: String,
    #[serde(rename = "type")]
    pub field_type: FieldTypeDescription,
    /// Kept for introspection only; default values never enter the hashed form.
    #[serde(default, skip_serializing)]
    pub default_value: String,
}

/// `type_description_interfaces/msg/FieldType`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FieldTypeDescription {
    pub type_id: u8,
    /// Array size or sequence bound, 0 otherwise.
    pub capacity: u64,
    /// Bound of `string<=N` / `wstring<=N` elements, 0 otherwise.
    pub string_capacity: u64,
    /// Empty for non-nested fields.
    pub nested_type_name: String,
}

impl FieldTypeDescription {
    pub fn of(kind: &FieldKind) -> Self {
        let string_capacity = match kind.element() {
            ElementType::BoundedString(n) | ElementType::BoundedWString(n) => *n as u64,
            _ => 0,
        };
        let nested_type_name = match kind.element() {
            ElementType::Nested(nested) => nested.name().to_string(),
            _ => String::new(),
        };
        Self {
            type_id: TypeId::of_field(kind),
            capacity: kind.capacity().unwrap_or(0) as u64,
            string_capacity,
            nested_type_name,
        }
    }

    fn nested(type_id: u8, capacity: u64, nested_type_name: impl Into<String>) -> Self {
        Self {
            type_id,
            capacity,
            string_capacity: 0,
            nested_type_name: nested_type_name.into(),
        }
    }
}

impl FieldDescription {
    fn new(name: &str, field_type: FieldTypeDescription) -> Self {
        Self {
            name: name.to_string(),
            field_type,
            default_value: String::new(),
        }
    }
}

impl From<&TypeDescriptor> for TypeDescription {
    fn from(desc: &TypeDescriptor) -> Self {
        Self {
            type_name: desc.name().to_string(),
            fields: desc
                .fields()
                .iter()
                .map(|f| FieldDescription {
                    name: f.name.clone(),
                    field_type: FieldTypeDescription::of(&f.kind),
                    default_value: f.default_value.clone().unwrap_or_default(),
                })
                .collect(),
        }
    }
}

impl From<&TypeDescriptor> for TypeDescriptionMsg {
    fn from(desc: &TypeDescriptor) -> Self {
        Self {
            type_description: desc.into(),
            referenced_type_descriptions: desc
                .referenced_types()
                .values()
                .map(|d| TypeDescription::from(d.as_ref()))
                .collect(),
        }
    }
}

impl From<&ServiceDescriptor> for TypeDescriptionMsg {
    /// The synthesized service type: request, response and event message,
    /// with the event carrying `ServiceEventInfo` and at most one of each payload.
    fn from(srv: &ServiceDescriptor) -> Self {
        let service_name = srv.name().to_string();
        let request_name = srv.request().name().to_string();
        let response_name = srv.response().name().to_string();
        let event_name = format!("{service_name}_Event");
        let info_name = srv.event_info().name().to_string();

        let main = TypeDescription {
            type_name: service_name,
            fields: vec![
                FieldDescription::new(
                    "request_message",
                    FieldTypeDescription::nested(TypeId::NESTED_TYPE, 0, &request_name),
                ),
                FieldDescription::new(
                    "response_message",
                    FieldTypeDescription::nested(TypeId::NESTED_TYPE, 0, &response_name),
                ),
                FieldDescription::new(
                    "event_message",
                    FieldTypeDescription::nested(TypeId::NESTED_TYPE, 0, &event_name),
                ),
            ],
        };

        let event = TypeDescription {
            type_name: event_name.clone(),
            fields: vec![
                FieldDescription::new(
                    "info",
                    FieldTypeDescription::nested(TypeId::NESTED_TYPE, 0, &info_name),
                ),
                FieldDescription::new(
                    "request",
                    FieldTypeDescription::nested(
                        TypeId::NESTED_TYPE_BOUNDED_SEQUENCE,
                        1,
                        &request_name,
                    ),
                ),
                FieldDescription::new(
                    "response",
                    FieldTypeDescription::nested(
                        TypeId::NESTED_TYPE_BOUNDED_SEQUENCE,
                        1,
                        &response_name,
                    ),
                ),
            ],
        };

        let mut referenced: BTreeMap<String, TypeDescription> = BTreeMap::new();
        referenced.insert(event_name, event);
        for desc in [srv.request(), srv.response(), srv.event_info()] {
            add_with_references(desc, &mut referenced);
        }

        Self {
            type_description: main,
            referenced_type_descriptions: referenced.into_values().collect(),
        }
    }
}

fn add_with_references(desc: &Arc<TypeDescriptor>, into: &mut BTreeMap<String, TypeDescription>) {
    into.insert(desc.name().to_string(), desc.as_ref().into());
    for (name, nested) in desc.referenced_types() {
        into.entry(name)
            .or_insert_with(|| nested.as_ref().into());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resolver::StaticResolver;

    #[test]
    fn header_description_lists_time_as_reference() {
        let header =
            TypeDescriptor::resolve("std_msgs/msg/Header", &StaticResolver::builtin()).unwrap();
        let msg = TypeDescriptionMsg::from(header.as_ref());
        assert_eq!(msg.type_description.fields[0].name, "stamp");
        assert_eq!(msg.type_description.fields[0].field_type.type_id, TypeId::NESTED_TYPE);
        assert_eq!(
            msg.type_description.fields[0].field_type.nested_type_name,
            "builtin_interfaces/msg/Time"
        );
        assert_eq!(msg.referenced_type_descriptions.len(), 1);
        assert_eq!(
            msg.referenced_type_descriptions[0].type_name,
            "builtin_interfaces/msg/Time"
        );
    }

    #[test]
    fn bounded_string_capacity() {
        let desc = TypeDescriptor::parse(
            "test_msgs/msg/Bounded",
            "string<=10 name\nint32[<=4] values \"[1, 2]\"",
            &StaticResolver::new(),
        )
        .unwrap();
        let td = TypeDescription::from(desc.as_ref());
        assert_eq!(td.fields[0].field_type.type_id, TypeId::BOUNDED_STRING);
        assert_eq!(td.fields[0].field_type.string_capacity, 10);
        assert_eq!(td.fields[1].field_type.type_id, TypeId::INT32 + 96);
        assert_eq!(td.fields[1].field_type.capacity, 4);
        assert_eq!(td.fields[1].default_value, "\"[1, 2]\"");

        let json = serde_json::to_string(&td).unwrap();
        assert!(!json.contains("default_value"));
    }

    #[test]
    fn service_description_shape() {
        let srv = ServiceDescriptor::resolve(
            "example_interfaces/srv/AddTwoInts",
            &StaticResolver::builtin(),
        )
        .unwrap();
        let msg = TypeDescriptionMsg::from(&srv);
        let fields: Vec<_> = msg
            .type_description
            .fields
            .iter()
            .map(|f| f.name.as_str())
            .collect();
        assert_eq!(fields, ["request_message", "response_message", "event_message"]);

        let names: Vec<_> = msg
            .referenced_type_descriptions
            .iter()
            .map(|t| t.type_name.as_str())
            .collect();
        assert_eq!(
            names,
            [
                "builtin_interfaces/msg/Time",
                "example_interfaces/srv/AddTwoInts_Event",
                "example_interfaces/srv/AddTwoInts_Request",
                "example_interfaces/srv/AddTwoInts_Response",
                "service_msgs/msg/ServiceEventInfo",
            ]
        );
    }
}
