use std::collections::HashSet;
use std::sync::Arc;

use super::declaration::{
    ClassDeclaration, DataObject, FieldDecl, FieldRole, MethodBody, MethodDecl, MethodMarker,
    Projection, Receiver,
};
use crate::dataobject::{
    DataObjectDescriptor, DataObjectKind, ExpandRule, ExpandRules, KeyRole, Redirect,
    ValueDescriptor,
};
use crate::error::{InterpretationError, MalformationError};
use crate::types::TypeKey;

/// Turns declarations into sealed data object descriptors.
///
/// Holds the built-in expand rules that declarations may opt into with
/// `builtin_expand_rule`. Interpretation itself is stateless; use a
/// [`DataObjectCache`](super::DataObjectCache) to avoid repeating it.
#[derive(Debug, Default, Clone)]
pub struct Interpreter {
    builtin_rules: ExpandRules,
}

impl Interpreter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an interpreter with the given built-in rules.
    ///
    /// # Returns
    /// `Err(MalformationError)` if two rules expand the same type.
    pub fn with_builtin_rules(
        rules: impl IntoIterator<Item = ExpandRule>,
    ) -> Result<Self, MalformationError> {
        let mut interpreter = Self::new();
        for rule in rules {
            interpreter.register_builtin_rule(rule)?;
        }
        Ok(interpreter)
    }

    pub fn register_builtin_rule(&mut self, rule: ExpandRule) -> Result<(), MalformationError> {
        let expanding_type = rule.expanding_type();
        if self.builtin_rules.contains_key(&expanding_type) {
            return Err(MalformationError::DuplicatedExpandRule {
                type_name: expanding_type.name().to_string(),
            });
        }
        self.builtin_rules.insert(expanding_type, Arc::new(rule));
        Ok(())
    }

    pub fn builtin_rule(&self, type_key: &TypeKey) -> Option<&Arc<ExpandRule>> {
        self.builtin_rules.get(type_key)
    }

    /// Shape declared by a type.
    ///
    /// # Returns
    /// `Ok(None)` for types without a declaration or without a shape,
    /// `Err(AmbiguousShape)` when more than one shape is declared.
    pub fn data_object_kind(
        &self,
        type_key: &TypeKey,
    ) -> Result<Option<DataObjectKind>, InterpretationError> {
        let declare = match type_key.declaration() {
            Some(declare) => declare,
            None => return Ok(None),
        };
        match Self::kind_of(&declare(), type_key) {
            Ok(kind) => Ok(Some(kind)),
            Err(InterpretationError::NotAnnotated { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    pub fn interpret<T: DataObject>(&self) -> Result<DataObjectDescriptor, InterpretationError> {
        self.interpret_type(&TypeKey::data_object::<T>())
    }

    /// Interprets a type that must have the unique shape.
    pub fn interpret_unique<T: DataObject>(
        &self,
    ) -> Result<DataObjectDescriptor, InterpretationError> {
        self.interpret_shaped::<T>(DataObjectKind::Unique)
    }

    /// Interprets a type that must have the multiple shape.
    pub fn interpret_multiple<T: DataObject>(
        &self,
    ) -> Result<DataObjectDescriptor, InterpretationError> {
        self.interpret_shaped::<T>(DataObjectKind::Multiple)
    }

    fn interpret_shaped<T: DataObject>(
        &self,
        expected: DataObjectKind,
    ) -> Result<DataObjectDescriptor, InterpretationError> {
        let descriptor = self.interpret::<T>()?;
        if descriptor.kind() != expected {
            return Err(InterpretationError::WrongShape {
                type_name: descriptor.data_type().name().to_string(),
                expected: expected.label(),
            });
        }
        Ok(descriptor)
    }

    /// Interprets a data object type.
    ///
    /// Walks the inheritance chain base first: class-level rules, then
    /// fields, then methods, for every level. Only the requested type seals.
    pub fn interpret_type(
        &self,
        type_key: &TypeKey,
    ) -> Result<DataObjectDescriptor, InterpretationError> {
        let declare = type_key
            .declaration()
            .ok_or_else(|| InterpretationError::NotAnnotated {
                type_name: type_key.name().to_string(),
            })?;
        let root = declare();
        let kind = Self::kind_of(&root, type_key)?;
        let mut descriptor = DataObjectDescriptor::new(kind, *type_key, root.constructor);

        let chain = Self::resolve_chain(root, *type_key)?;
        let mut rules = ExpandRules::new();
        for level in (0..chain.len()).rev() {
            self.parse_class(&chain[level], &mut rules)?;
            Self::parse_fields(&chain[level], *type_key, &mut descriptor)?;
            Self::parse_methods(&chain, level, &mut descriptor)?;
        }

        descriptor.set_expand_rules(rules)?;
        descriptor.seal()?;
        tracing::debug!(
            "Interpreted {} data object {} ({} keys, {} values)",
            kind.label(),
            type_key,
            descriptor.keys().len(),
            descriptor.values().len()
        );
        Ok(descriptor)
    }

    fn kind_of(
        declaration: &ClassDeclaration,
        type_key: &TypeKey,
    ) -> Result<DataObjectKind, InterpretationError> {
        match declaration.shapes.as_slice() {
            [] => Err(InterpretationError::NotAnnotated {
                type_name: type_key.name().to_string(),
            }),
            [kind] => Ok(*kind),
            _ => Err(InterpretationError::AmbiguousShape {
                type_name: type_key.name().to_string(),
            }),
        }
    }

    /// Root declaration followed by every inherited base, each lifted to
    /// operate on the root object.
    fn resolve_chain(
        root: ClassDeclaration,
        root_type: TypeKey,
    ) -> Result<Vec<ClassDeclaration>, MalformationError> {
        let mut chain = vec![root];
        let mut projection: Option<Projection> = None;
        loop {
            let inheritance = {
                let current = &chain[chain.len() - 1];
                match current.inheritance.as_slice() {
                    [] => break,
                    [single] => single.clone(),
                    _ => {
                        return Err(MalformationError::MultipleInheritance {
                            type_name: current.data_type.name().to_string(),
                        })
                    }
                }
            };
            if chain.iter().any(|level| level.data_type == inheritance.base) {
                return Err(MalformationError::InheritanceCycle {
                    type_name: inheritance.base.name().to_string(),
                });
            }
            let declare = match inheritance.base.declaration() {
                Some(declare) => declare,
                None => break,
            };
            let composed = match &projection {
                Some(outer) => outer.then(&inheritance.projection),
                None => inheritance.projection.clone(),
            };
            chain.push(declare().lift(&composed, root_type));
            projection = Some(composed);
        }
        Ok(chain)
    }

    fn parse_class(
        &self,
        declaration: &ClassDeclaration,
        rules: &mut ExpandRules,
    ) -> Result<(), MalformationError> {
        let mut declared = HashSet::new();
        for expanding_type in &declaration.builtin_rules {
            let rule = self.builtin_rules.get(expanding_type).ok_or_else(|| {
                MalformationError::UnsupportedBuiltinRule {
                    type_name: expanding_type.name().to_string(),
                }
            })?;
            if !declared.insert(*expanding_type) {
                return Err(MalformationError::DuplicatedExpandRule {
                    type_name: expanding_type.name().to_string(),
                });
            }
            rules.insert(*expanding_type, rule.clone());
        }
        for draft in &declaration.custom_rules {
            let expanding_type = draft.expanding_type;
            if !declared.insert(expanding_type) {
                return Err(MalformationError::DuplicatedExpandRule {
                    type_name: expanding_type.name().to_string(),
                });
            }
            let rule = draft
                .clone()
                .seal_with(|| MalformationError::EmptyExpandRule {
                    target: format!("global rule of type {}", expanding_type),
                })?;
            rules.insert(expanding_type, Arc::new(rule));
        }
        Ok(())
    }

    fn parse_fields(
        declaration: &ClassDeclaration,
        root_type: TypeKey,
        descriptor: &mut DataObjectDescriptor,
    ) -> Result<(), MalformationError> {
        for field in &declaration.fields {
            let role = match field.roles.as_slice() {
                [] => continue,
                [role] => role,
                _ => {
                    return Err(MalformationError::DuplicatedValueMetadata {
                        field: field.name.clone(),
                    })
                }
            };
            let (key_role, declared_name) = match role {
                FieldRole::Key(name) => (Some(KeyRole::Unique), name),
                FieldRole::PrimaryKey(name) => (Some(KeyRole::Primary), name),
                FieldRole::SecondaryKey(name) => (Some(KeyRole::Secondary), name),
                FieldRole::Value(name) => (None, name),
            };
            let name = if declared_name.is_empty() {
                &field.name
            } else {
                declared_name
            };
            if name.is_empty() {
                return Err(MalformationError::UnresolvedName {
                    field: format!("{}::<unnamed>", declaration.data_type),
                });
            }

            let value = Self::build_value(field, name, root_type)?;
            match key_role {
                Some(role) => descriptor.put_key(role, value)?,
                None => descriptor.put_value(value)?,
            }
        }
        Ok(())
    }

    fn build_value(
        field: &FieldDecl,
        name: &str,
        root_type: TypeKey,
    ) -> Result<ValueDescriptor, MalformationError> {
        let mut value = ValueDescriptor::new(field.value_type, root_type)
            .with_container(field.structure, field.container.clone());
        value.set_name(name)?;
        value.set_owner(root_type)?;
        value.set_accessor(field.accessor.clone())?;
        value.set_mutator(field.mutator.clone())?;
        value.set_metadata(field.metadata)?;
        if let Some(constructor) = &field.constructor {
            value.set_constructor(constructor.clone())?;
        }
        if let Some(signature) = &field.signature {
            value.set_signature(signature.clone())?;
        }
        if let Some(draft) = &field.expandable {
            let rule = draft
                .clone()
                .seal_with(|| MalformationError::EmptyExpandRule {
                    target: format!("\"{}\"", field.name),
                })?;
            value.set_expand_rule(Arc::new(rule))?;
        }
        Ok(value)
    }

    fn parse_methods(
        chain: &[ClassDeclaration],
        level: usize,
        descriptor: &mut DataObjectDescriptor,
    ) -> Result<(), MalformationError> {
        let declaration = &chain[level];
        let inherited = !declaration.inheritance.is_empty();
        let ancestors = &chain[level + 1..];
        let level_type = declaration.data_type;

        for method in &declaration.methods {
            let method_name = format!("{}::{}", level_type, method.name);
            let mut roles: Vec<MethodMarker> = Vec::new();
            let mut inherited_getter = None;
            let mut inherited_setter = None;
            for marker in &method.markers {
                match marker {
                    MethodMarker::InheritedGetter(pinned) => inherited_getter = Some(pinned),
                    MethodMarker::InheritedSetter(pinned) => inherited_setter = Some(pinned),
                    other => roles.push(other.clone()),
                }
            }

            match (inherited_getter, inherited_setter) {
                (Some(_), Some(_)) => {
                    return Err(MalformationError::DuplicatedInheritanceMarker {
                        method: method_name,
                    })
                }
                (Some(pinned), None) => {
                    let found =
                        Self::inherited_value(ancestors, method, true, pinned, &method_name)?;
                    roles.push(MethodMarker::OverrideGetter(found));
                }
                (None, Some(pinned)) => {
                    let found =
                        Self::inherited_value(ancestors, method, false, pinned, &method_name)?;
                    roles.push(MethodMarker::OverrideSetter(found));
                }
                (None, None) => {}
            }

            let role = match roles.as_slice() {
                [] => continue,
                [role] => role,
                _ => {
                    return Err(MalformationError::DuplicatedMethodMetadata {
                        method: method_name,
                    })
                }
            };

            match role {
                MethodMarker::Getter(name) | MethodMarker::Setter(name) => {
                    let getter = matches!(role, MethodMarker::Getter(_));
                    let label = if getter { "getter" } else { "setter" };
                    let value = descriptor.value_object_mut(name).ok_or_else(|| {
                        MalformationError::NoSuchValue {
                            role: label,
                            method: method_name.clone(),
                            name: name.clone(),
                        }
                    })?;
                    if Self::redirect_of(value, getter).is_some() {
                        return Err(MalformationError::DuplicatedRedirect {
                            role: label,
                            method: method_name,
                            name: name.clone(),
                        });
                    }
                    Self::redirect(value, method, &method_name, level_type, getter)?;
                }
                MethodMarker::OverrideGetter(name) | MethodMarker::OverrideSetter(name) => {
                    let getter = matches!(role, MethodMarker::OverrideGetter(_));
                    let label = if getter { "getter" } else { "setter" };
                    if !inherited {
                        return Err(MalformationError::OverrideWithoutInheritance {
                            role: if getter { "OverrideGetter" } else { "OverrideSetter" },
                            method: method_name,
                        });
                    }
                    let value = descriptor.value_object_mut(name).ok_or_else(|| {
                        MalformationError::OverrideOfNonexistent {
                            role: label,
                            method: method_name.clone(),
                            name: name.clone(),
                        }
                    })?;
                    if Self::redirect_of(value, getter).map(|r| r.declared_by) == Some(level_type) {
                        return Err(MalformationError::DuplicatedRedirect {
                            role: label,
                            method: method_name,
                            name: name.clone(),
                        });
                    }
                    Self::redirect(value, method, &method_name, level_type, getter)?;
                }
                MethodMarker::InheritedGetter(_) | MethodMarker::InheritedSetter(_) => {}
            }
        }
        Ok(())
    }

    fn redirect_of(value: &ValueDescriptor, getter: bool) -> Option<&Redirect> {
        if getter {
            value.accessor().and_then(|a| a.redirect())
        } else {
            value.mutator().and_then(|m| m.redirect())
        }
    }

    /// Value name bound by the nearest ancestor method with the same name
    /// and parameters.
    fn inherited_value(
        ancestors: &[ClassDeclaration],
        method: &MethodDecl,
        getter: bool,
        pinned: &str,
        method_name: &str,
    ) -> Result<String, MalformationError> {
        let (role, marker) = if getter {
            ("getter", "Getter")
        } else {
            ("setter", "Setter")
        };
        let found = ancestors.iter().find_map(|ancestor| {
            let candidate = ancestor.methods.iter().find(|m| {
                m.name == method.name && m.signature.params == method.signature.params
            })?;
            candidate.markers.iter().find_map(|m| match (m, getter) {
                (MethodMarker::Getter(name), true)
                | (MethodMarker::OverrideGetter(name), true)
                | (MethodMarker::Setter(name), false)
                | (MethodMarker::OverrideSetter(name), false) => Some(name.clone()),
                _ => None,
            })
        });
        let found = found.ok_or_else(|| MalformationError::NotInherited {
            role,
            marker,
            method: method_name.to_string(),
            type_name: ancestors
                .first()
                .map(|a| a.data_type.name())
                .unwrap_or("<none>")
                .to_string(),
        })?;
        if !pinned.is_empty() && pinned != found {
            return Err(MalformationError::IncompatibleInheritance {
                role,
                method: method_name.to_string(),
                pinned: pinned.to_string(),
                inherited: found,
            });
        }
        Ok(found)
    }

    fn redirect(
        value: &mut ValueDescriptor,
        method: &MethodDecl,
        method_name: &str,
        level_type: TypeKey,
        getter: bool,
    ) -> Result<(), MalformationError> {
        let redirect = Redirect {
            declared_by: level_type,
            method: method.name.clone(),
        };
        let signature = &method.signature;
        let value_type = value.value_type();

        if getter {
            if signature.returns != Some(value_type) {
                return Err(MalformationError::ReturnType {
                    method: method_name.to_string(),
                    declared: signature
                        .returns
                        .map(|r| r.name())
                        .unwrap_or("()")
                        .to_string(),
                    expected: value_type.name().to_string(),
                });
            }
            match signature.receiver {
                Receiver::Static => {
                    check_argument_count("getter", method_name, 1, signature.params.len())?;
                    check_argument("getter", method_name, 0, signature.params[0], level_type)?;
                }
                Receiver::Instance => {
                    check_argument_count("getter", method_name, 0, signature.params.len())?
                }
            }
            match &method.body {
                MethodBody::Get(accessor) => {
                    value.set_accessor(accessor.clone().redirected(redirect))
                }
                MethodBody::Set(_) => Err(MalformationError::ReturnType {
                    method: method_name.to_string(),
                    declared: "()".to_string(),
                    expected: value_type.name().to_string(),
                }),
            }
        } else {
            match signature.receiver {
                Receiver::Static => {
                    check_argument_count("setter", method_name, 2, signature.params.len())?;
                    check_argument("setter", method_name, 0, signature.params[0], level_type)?;
                    check_argument("setter", method_name, 1, signature.params[1], value_type)?;
                }
                Receiver::Instance => {
                    check_argument_count("setter", method_name, 1, signature.params.len())?;
                    check_argument("setter", method_name, 0, signature.params[0], value_type)?;
                }
            }
            match &method.body {
                MethodBody::Set(mutator) => value.set_mutator(mutator.clone().redirected(redirect)),
                MethodBody::Get(_) => Err(MalformationError::ArgumentCount {
                    role: "setter",
                    method: method_name.to_string(),
                    required: 1,
                    found: 0,
                }),
            }
        }
    }
}

fn check_argument_count(
    role: &'static str,
    method: &str,
    required: usize,
    found: usize,
) -> Result<(), MalformationError> {
    if required != found {
        return Err(MalformationError::ArgumentCount {
            role,
            method: method.to_string(),
            required,
            found,
        });
    }
    Ok(())
}

fn check_argument(
    role: &'static str,
    method: &str,
    index: usize,
    declared: TypeKey,
    expected: TypeKey,
) -> Result<(), MalformationError> {
    if declared != expected {
        return Err(MalformationError::ArgumentType {
            role,
            method: method.to_string(),
            index,
            declared: declared.name().to_string(),
            expected: expected.name().to_string(),
        });
    }
    Ok(())
}
