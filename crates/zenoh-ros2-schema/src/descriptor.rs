//! Resolved type descriptors.
//!
//! A [`TypeDescriptor`] is a parsed definition whose nested references have
//! all been resolved, recursively, through a [`TypeResolver`]. Descriptors are
//! immutable and shared behind `Arc`, so one nested type referenced from many
//! places is parsed once per build.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use tracing::trace;

use crate::error::{Result, SchemaError};
use crate::parser::{self, ArraySpec, BaseRef, Constant, ParsedDefinition, Primitive};
use crate::resolver::{StaticResolver, TypeResolver};
use crate::type_name::{InterfaceKind, TypeName};

/// Name of the placeholder member added to messages without fields.
pub const EMPTY_STRUCT_MEMBER: &str = "structure_needs_at_least_one_member";

const SERVICE_EVENT_INFO: &str = "service_msgs/msg/ServiceEventInfo";

/// Element type of a field after resolution.
#[derive(Debug, Clone, PartialEq)]
pub enum ElementType {
    Primitive(Primitive),
    BoundedString(usize),
    BoundedWString(usize),
    Nested(Arc<TypeDescriptor>),
}

impl ElementType {
    /// CDR alignment of one element. Nested types align to their first member
    /// on their own, so they report 1 here.
    pub fn alignment(&self) -> usize {
        match self {
            ElementType::Primitive(p) => p.alignment(),
            ElementType::BoundedString(_) | ElementType::BoundedWString(_) => 4,
            ElementType::Nested(_) => 1,
        }
    }
}

/// Field kind: a single element or one of the three collection forms.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldKind {
    Scalar(ElementType),
    Array(ElementType, usize),
    BoundedSequence(ElementType, usize),
    Sequence(ElementType),
}

impl FieldKind {
    pub fn element(&self) -> &ElementType {
        match self {
            FieldKind::Scalar(e)
            | FieldKind::Array(e, _)
            | FieldKind::BoundedSequence(e, _)
            | FieldKind::Sequence(e) => e,
        }
    }

    /// Array size or sequence bound.
    pub fn capacity(&self) -> Option<usize> {
        match self {
            FieldKind::Array(_, n) | FieldKind::BoundedSequence(_, n) => Some(*n),
            FieldKind::Scalar(_) | FieldKind::Sequence(_) => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct FieldDescriptor {
    pub name: String,
    pub kind: FieldKind,
    /// Raw default value text as written in the definition.
    pub default_value: Option<String>,
}

/// A fully resolved message type.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeDescriptor {
    name: TypeName,
    fields: Vec<FieldDescriptor>,
    constants: Vec<Constant>,
}

impl TypeDescriptor {
    /// Parse `text` as the definition of `type_name`, resolving nested types through `resolver`.
    pub fn parse(type_name: &str, text: &str, resolver: &dyn TypeResolver) -> Result<Arc<Self>> {
        let name: TypeName = type_name.parse()?;
        DescriptorBuilder::new(resolver).build_message(&name, text)
    }

    /// Look up the definition of `type_name` through `resolver` and parse it.
    pub fn resolve(type_name: &str, resolver: &dyn TypeResolver) -> Result<Arc<Self>> {
        let name: TypeName = type_name.parse()?;
        DescriptorBuilder::new(resolver).load(&name)
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    pub fn fields(&self) -> &[FieldDescriptor] {
        &self.fields
    }

    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Directly referenced nested types, keyed by fully qualified name.
    pub fn nested_types(&self) -> BTreeMap<String, Arc<TypeDescriptor>> {
        self.fields
            .iter()
            .filter_map(|f| match f.kind.element() {
                ElementType::Nested(nested) => Some((nested.name.to_string(), nested.clone())),
                _ => None,
            })
            .collect()
    }

    /// Every transitively referenced nested type, keyed (and therefore sorted) by name.
    pub fn referenced_types(&self) -> BTreeMap<String, Arc<TypeDescriptor>> {
        let mut collected = BTreeMap::new();
        collect_referenced(self, &mut collected);
        collected
    }

    /// Build a descriptor directly from already resolved fields.
    ///
    /// Duplicate field names are rejected; an empty field list receives the
    /// placeholder member.
    pub fn from_fields(name: TypeName, fields: Vec<FieldDescriptor>) -> Result<Self> {
        let mut seen = HashSet::new();
        for field in &fields {
            if !seen.insert(field.name.as_str()) {
                return Err(SchemaError::DuplicateField {
                    type_name: name.to_string(),
                    field: field.name.clone(),
                });
            }
        }
        Ok(Self {
            name,
            fields: with_placeholder(fields),
            constants: Vec::new(),
        })
    }
}

fn collect_referenced(desc: &TypeDescriptor, collected: &mut BTreeMap<String, Arc<TypeDescriptor>>) {
    for (name, nested) in desc.nested_types() {
        if !collected.contains_key(&name) {
            collect_referenced(&nested, collected);
            collected.insert(name, nested);
        }
    }
}

fn with_placeholder(mut fields: Vec<FieldDescriptor>) -> Vec<FieldDescriptor> {
    if fields.is_empty() {
        fields.push(FieldDescriptor {
            name: EMPTY_STRUCT_MEMBER.to_string(),
            kind: FieldKind::Scalar(ElementType::Primitive(Primitive::Uint8)),
            default_value: None,
        });
    }
    fields
}

/// A service type with its resolved request and response messages.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceDescriptor {
    name: TypeName,
    request: Arc<TypeDescriptor>,
    response: Arc<TypeDescriptor>,
    event_info: Arc<TypeDescriptor>,
}

impl ServiceDescriptor {
    /// Parse `.srv` text for `service_name` (`pkg/srv/Name`).
    pub fn parse(service_name: &str, text: &str, resolver: &dyn TypeResolver) -> Result<Self> {
        let name: TypeName = service_name.parse()?;
        DescriptorBuilder::new(resolver).build_service(&name, text)
    }

    /// Look up the `.srv` text of `service_name` through `resolver` and parse it.
    pub fn resolve(service_name: &str, resolver: &dyn TypeResolver) -> Result<Self> {
        let name: TypeName = service_name.parse()?;
        let text = resolver
            .resolve(&name)
            .ok_or_else(|| SchemaError::UnresolvedType(name.to_string()))?;
        DescriptorBuilder::new(resolver).build_service(&name, &text)
    }

    pub fn name(&self) -> &TypeName {
        &self.name
    }

    /// `pkg/srv/Name_Request`
    pub fn request(&self) -> &Arc<TypeDescriptor> {
        &self.request
    }

    /// `pkg/srv/Name_Response`
    pub fn response(&self) -> &Arc<TypeDescriptor> {
        &self.response
    }

    /// `service_msgs/msg/ServiceEventInfo`, referenced by the service event type.
    pub fn event_info(&self) -> &Arc<TypeDescriptor> {
        &self.event_info
    }
}

/// Recursive builder tracking the types currently being resolved (for cycle
/// detection) and the ones already finished (for sharing).
pub(crate) struct DescriptorBuilder<'r> {
    resolver: &'r dyn TypeResolver,
    done: HashMap<TypeName, Arc<TypeDescriptor>>,
    stack: Vec<TypeName>,
}

impl<'r> DescriptorBuilder<'r> {
    pub(crate) fn new(resolver: &'r dyn TypeResolver) -> Self {
        Self {
            resolver,
            done: HashMap::new(),
            stack: Vec::new(),
        }
    }

    /// Seed the builder with descriptors resolved earlier.
    pub(crate) fn with_known<I>(mut self, known: I) -> Self
    where
        I: IntoIterator<Item = Arc<TypeDescriptor>>,
    {
        self.done
            .extend(known.into_iter().map(|d| (d.name.clone(), d)));
        self
    }

    /// Every descriptor built or reused so far.
    pub(crate) fn into_known(self) -> impl Iterator<Item = Arc<TypeDescriptor>> {
        self.done.into_values()
    }

    pub(crate) fn load(&mut self, name: &TypeName) -> Result<Arc<TypeDescriptor>> {
        if let Some(done) = self.done.get(name) {
            return Ok(done.clone());
        }
        let text = self
            .resolver
            .resolve(name)
            .ok_or_else(|| SchemaError::UnresolvedType(name.to_string()))?;
        self.build_message(name, &text)
    }

    pub(crate) fn build_message(&mut self, name: &TypeName, text: &str) -> Result<Arc<TypeDescriptor>> {
        let definition = parser::parse_definition(text, &name.to_string())?;
        let descriptor = Arc::new(self.resolve_definition(name, definition)?);
        self.done.insert(name.clone(), descriptor.clone());
        Ok(descriptor)
    }

    pub(crate) fn build_service(&mut self, name: &TypeName, text: &str) -> Result<ServiceDescriptor> {
        if name.kind() != InterfaceKind::Srv {
            return Err(SchemaError::InvalidTypeName(name.to_string()));
        }
        let (request_text, response_text) = parser::split_service(text)
            .ok_or_else(|| SchemaError::MissingServiceSeparator(name.to_string()))?;
        let request = self.build_message(&name.with_suffix("_Request"), &request_text)?;
        let response = self.build_message(&name.with_suffix("_Response"), &response_text)?;

        let event_info_name: TypeName = SERVICE_EVENT_INFO.parse()?;
        let event_info = match self.done.get(&event_info_name) {
            Some(info) => info.clone(),
            None => {
                // Always taken from the built-in definitions so the service hash
                // cannot drift with user-provided copies.
                let builtins = StaticResolver::builtin();
                let mut builder = DescriptorBuilder::new(&builtins);
                builder.load(&event_info_name)?
            }
        };

        Ok(ServiceDescriptor {
            name: name.clone(),
            request,
            response,
            event_info,
        })
    }

    fn resolve_definition(
        &mut self,
        name: &TypeName,
        definition: ParsedDefinition,
    ) -> Result<TypeDescriptor> {
        self.stack.push(name.clone());
        let mut fields = Vec::with_capacity(definition.fields.len());
        for field in definition.fields {
            let element = match field.type_ref.base {
                BaseRef::Primitive(p) => ElementType::Primitive(p),
                BaseRef::BoundedString(n) => ElementType::BoundedString(n),
                BaseRef::BoundedWString(n) => ElementType::BoundedWString(n),
                BaseRef::Named(reference) => {
                    let nested = name.resolve_reference(&reference)?;
                    if let Some(pos) = self.stack.iter().position(|n| *n == nested) {
                        let mut cycle: Vec<String> =
                            self.stack[pos..].iter().map(|n| n.to_string()).collect();
                        cycle.push(nested.to_string());
                        return Err(SchemaError::CyclicType(cycle));
                    }
                    trace!("resolving {} for {}.{}", nested, name, field.name);
                    ElementType::Nested(self.load(&nested)?)
                }
            };
            let kind = match field.type_ref.array {
                ArraySpec::Single => FieldKind::Scalar(element),
                ArraySpec::Fixed(n) => FieldKind::Array(element, n),
                ArraySpec::Bounded(n) => FieldKind::BoundedSequence(element, n),
                ArraySpec::Unbounded => FieldKind::Sequence(element),
            };
            fields.push(FieldDescriptor {
                name: field.name,
                kind,
                default_value: field.default_value,
            });
        }
        self.stack.pop();

        Ok(TypeDescriptor {
            name: name.clone(),
            fields: with_placeholder(fields),
            constants: definition.constants,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> StaticResolver {
        StaticResolver::builtin()
            .with_definition("test_msgs/msg/Inner", "float64 value")
            .with_definition("test_msgs/msg/Outer", "Inner a\nInner[2] b\ntest_msgs/Inner[] c")
            .with_definition("test_msgs/msg/SelfRef", "SelfRef next")
            .with_definition("test_msgs/msg/A", "B b")
            .with_definition("test_msgs/msg/B", "A a")
            .with_definition("test_msgs/msg/Missing", "DoesNotExist x")
    }

    #[test]
    fn resolves_nested_types_once() {
        let resolver = resolver();
        let outer = TypeDescriptor::resolve("test_msgs/msg/Outer", &resolver).unwrap();
        assert_eq!(outer.fields().len(), 3);
        assert_eq!(outer.nested_types().len(), 1);

        let (ElementType::Nested(a), ElementType::Nested(b)) = (
            outer.fields()[0].kind.element(),
            outer.fields()[1].kind.element(),
        ) else {
            panic!("expected nested fields");
        };
        assert!(Arc::ptr_eq(a, b));
        assert_eq!(outer.fields()[1].kind.capacity(), Some(2));
        assert!(matches!(outer.fields()[2].kind, FieldKind::Sequence(_)));
    }

    #[test]
    fn collects_transitive_references_sorted() {
        let twist = TypeDescriptor::resolve("geometry_msgs/msg/Twist", &resolver()).unwrap();
        let refs: Vec<_> = twist.referenced_types().into_keys().collect();
        assert_eq!(refs, vec!["geometry_msgs/msg/Vector3"]);

        let header = TypeDescriptor::resolve("std_msgs/msg/Header", &resolver()).unwrap();
        let refs: Vec<_> = header.referenced_types().into_keys().collect();
        assert_eq!(refs, vec!["builtin_interfaces/msg/Time"]);
    }

    #[test]
    fn rejects_cycles() {
        let err = TypeDescriptor::resolve("test_msgs/msg/SelfRef", &resolver()).unwrap_err();
        assert!(matches!(err, SchemaError::CyclicType(ref c) if c.len() == 2));

        let err = TypeDescriptor::resolve("test_msgs/msg/A", &resolver()).unwrap_err();
        let SchemaError::CyclicType(cycle) = err else {
            panic!("expected a cycle");
        };
        assert_eq!(
            cycle,
            vec!["test_msgs/msg/A", "test_msgs/msg/B", "test_msgs/msg/A"]
        );
    }

    #[test]
    fn reports_unresolved_types() {
        let err = TypeDescriptor::resolve("test_msgs/msg/Missing", &resolver()).unwrap_err();
        assert!(
            matches!(err, SchemaError::UnresolvedType(ref name) if name == "test_msgs/msg/DoesNotExist")
        );
    }

    #[test]
    fn empty_messages_get_placeholder_member() {
        let empty = TypeDescriptor::parse("test_msgs/msg/Empty", "# nothing\n", &resolver()).unwrap();
        assert_eq!(empty.fields().len(), 1);
        assert_eq!(empty.fields()[0].name, EMPTY_STRUCT_MEMBER);
    }

    #[test]
    fn parses_services() {
        let srv = ServiceDescriptor::resolve("example_interfaces/srv/AddTwoInts", &resolver()).unwrap();
        assert_eq!(srv.request().name().to_string(), "example_interfaces/srv/AddTwoInts_Request");
        assert_eq!(srv.request().fields().len(), 2);
        assert_eq!(srv.response().fields()[0].name, "sum");
        assert_eq!(srv.event_info().name().to_string(), SERVICE_EVENT_INFO);

        assert!(matches!(
            ServiceDescriptor::parse("pkg/srv/Broken", "int64 a", &resolver()),
            Err(SchemaError::MissingServiceSeparator(_))
        ));
        assert!(matches!(
            ServiceDescriptor::parse("pkg/msg/NotAService", "---", &resolver()),
            Err(SchemaError::InvalidTypeName(_))
        ));
    }
}
