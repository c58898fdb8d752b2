//! Code-level declarations of mapped types.
//!
//! A mapped type implements [`DataObject`] and enumerates its shape, keys,
//! values, expand rules and accessor methods in [`DataObject::declare`].
//! Nothing is validated here; the interpreter checks the recorded
//! declarations and reports every conflict as a `MalformationError`.
//!
//! ```ignore
//! #[derive(Default, Clone)]
//! struct Account {
//!     id: i64,
//!     owner: String,
//! }
//!
//! impl DataObject for Account {
//!     fn declare(d: &mut Declaration<Self>) {
//!         d.unique();
//!         d.field("id", |a| &a.id, |a| &mut a.id).key("");
//!         d.field("owner", |a| &a.owner, |a| &mut a.owner).value("").not_null();
//!     }
//! }
//! ```

use std::any::Any;
use std::marker::PhantomData;
use std::sync::Arc;

use crate::dataobject::container::ContainerOps;
use crate::dataobject::expand::{ExpandRuleBuilder, RuleDraft};
use crate::dataobject::value::{get_fn, set_fn, GetFn, SetFn};
use crate::dataobject::{
    Accessor, Constructor, DataObjectKind, ListContainer, MapContainer, Mutator, SetContainer,
    Structure, ValueMetadata,
};
use crate::error::DataObjectError;
use crate::types::{AnyValue, TypeKey};

/// A type that maps to rows.
pub trait DataObject: Any + Send + Default {
    fn declare(d: &mut Declaration<Self>);
}

pub(crate) fn declare_erased<T: DataObject>() -> ClassDeclaration {
    let mut declaration = Declaration::<T>::new();
    T::declare(&mut declaration);
    declaration.raw
}

fn construct_erased<T: DataObject>() -> AnyValue {
    Box::new(T::default())
}

type ProjectFn = Arc<dyn for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync>;
type ProjectMutFn = Arc<dyn for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync>;

fn project<F>(f: F) -> ProjectFn
where
    F: for<'a> Fn(&'a dyn Any) -> Option<&'a dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

fn project_mut<F>(f: F) -> ProjectMutFn
where
    F: for<'a> Fn(&'a mut dyn Any) -> Option<&'a mut dyn Any> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Path from a derived object to the base object it embeds.
#[derive(Clone)]
pub(crate) struct Projection {
    get: ProjectFn,
    get_mut: ProjectMutFn,
}

impl Projection {
    fn new<T: Any, B: Any>(get: fn(&T) -> &B, get_mut: fn(&mut T) -> &mut B) -> Self {
        Self {
            get: project(move |object| object.downcast_ref::<T>().map(|t| get(t) as &dyn Any)),
            get_mut: project_mut(move |object| {
                object
                    .downcast_mut::<T>()
                    .map(|t| get_mut(t) as &mut dyn Any)
            }),
        }
    }

    /// Projects through `self`, then through `inner`.
    pub(crate) fn then(&self, inner: &Projection) -> Projection {
        let (outer_get, inner_get) = (self.get.clone(), inner.get.clone());
        let (outer_mut, inner_mut) = (self.get_mut.clone(), inner.get_mut.clone());
        Projection {
            get: project(move |object| outer_get(object).and_then(|mid| inner_get(mid))),
            get_mut: project_mut(move |object| outer_mut(object).and_then(|mid| inner_mut(mid))),
        }
    }

    fn lift_get(&self, get: GetFn, root: &'static str) -> GetFn {
        let project = self.get.clone();
        get_fn(move |object: &dyn Any| {
            let base = project(object).ok_or(DataObjectError::IncapableObject { expected: root })?;
            get(base)
        })
    }

    fn lift_set(&self, set: SetFn, root: &'static str) -> SetFn {
        let project = self.get_mut.clone();
        set_fn(move |object: &mut dyn Any, value: Option<AnyValue>| {
            let base = project(object).ok_or(DataObjectError::IncapableObject { expected: root })?;
            set(base, value)
        })
    }

    fn lift_accessor(&self, accessor: &Accessor, root: &'static str) -> Accessor {
        Accessor::from_fn(self.lift_get(accessor.get_fn().clone(), root))
    }

    fn lift_mutator(&self, mutator: &Mutator, root: &'static str) -> Mutator {
        Mutator::from_fn(self.lift_set(mutator.set_fn().clone(), root))
    }
}

#[derive(Clone)]
pub(crate) struct Inheritance {
    pub(crate) base: TypeKey,
    pub(crate) projection: Projection,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum FieldRole {
    Key(String),
    PrimaryKey(String),
    SecondaryKey(String),
    Value(String),
}

pub(crate) struct FieldDecl {
    pub(crate) name: String,
    pub(crate) value_type: TypeKey,
    pub(crate) structure: Structure,
    pub(crate) container: Option<ContainerOps>,
    pub(crate) accessor: Accessor,
    pub(crate) mutator: Mutator,
    pub(crate) roles: Vec<FieldRole>,
    pub(crate) constructor: Option<Constructor>,
    pub(crate) signature: Option<Vec<TypeKey>>,
    pub(crate) metadata: ValueMetadata,
    pub(crate) expandable: Option<RuleDraft>,
}

/// How a method receives its owner.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Receiver {
    Instance,
    /// Associated function taking the owner as its first argument
    Static,
}

/// Parameter and return shape of a declared method.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MethodSignature {
    pub receiver: Receiver,
    pub params: Vec<TypeKey>,
    pub returns: Option<TypeKey>,
}

#[derive(Clone)]
pub(crate) enum MethodBody {
    Get(Accessor),
    Set(Mutator),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum MethodMarker {
    Getter(String),
    Setter(String),
    OverrideGetter(String),
    OverrideSetter(String),
    InheritedGetter(String),
    InheritedSetter(String),
}

pub(crate) struct MethodDecl {
    pub(crate) name: String,
    pub(crate) signature: MethodSignature,
    pub(crate) body: MethodBody,
    pub(crate) markers: Vec<MethodMarker>,
}

/// A getter or setter of `T`.
pub struct Method<T> {
    signature: MethodSignature,
    body: MethodBody,
    _marker: PhantomData<fn(T)>,
}

impl<T: Any> Method<T> {
    fn build(
        receiver: Receiver,
        params: Vec<TypeKey>,
        returns: Option<TypeKey>,
        body: MethodBody,
    ) -> Self {
        Self {
            signature: MethodSignature {
                receiver,
                params,
                returns,
            },
            body,
            _marker: PhantomData,
        }
    }

    /// `fn(&self) -> V`
    pub fn getter<V: Any + Send>(get: fn(&T) -> V) -> Self {
        Self::build(
            Receiver::Instance,
            Vec::new(),
            Some(TypeKey::of::<V>()),
            MethodBody::Get(Accessor::method(get)),
        )
    }

    /// `fn(&self) -> Option<V>`, for nullable values of type `V`.
    pub fn optional_getter<V: Any + Send>(get: fn(&T) -> Option<V>) -> Self {
        Self::build(
            Receiver::Instance,
            Vec::new(),
            Some(TypeKey::of::<V>()),
            MethodBody::Get(Accessor::optional_method(get)),
        )
    }

    /// `fn(owner: &T) -> V`
    pub fn static_getter<V: Any + Send>(get: fn(&T) -> V) -> Self {
        Self::build(
            Receiver::Static,
            vec![TypeKey::of::<T>()],
            Some(TypeKey::of::<V>()),
            MethodBody::Get(Accessor::method(get)),
        )
    }

    /// `fn(&mut self, V)`
    pub fn setter<V: Any + Send>(set: fn(&mut T, V)) -> Self {
        Self::build(
            Receiver::Instance,
            vec![TypeKey::of::<V>()],
            None,
            MethodBody::Set(Mutator::method(set)),
        )
    }

    pub fn optional_setter<V: Any + Send>(set: fn(&mut T, Option<V>)) -> Self {
        Self::build(
            Receiver::Instance,
            vec![TypeKey::of::<V>()],
            None,
            MethodBody::Set(Mutator::optional_method(set)),
        )
    }

    /// `fn(owner: &mut T, V)`
    pub fn static_setter<V: Any + Send>(set: fn(&mut T, V)) -> Self {
        Self::build(
            Receiver::Static,
            vec![TypeKey::of::<T>(), TypeKey::of::<V>()],
            None,
            MethodBody::Set(Mutator::method(set)),
        )
    }

    pub fn signature(&self) -> &MethodSignature {
        &self.signature
    }
}

/// Erased declarations of one type.
pub(crate) struct ClassDeclaration {
    pub(crate) data_type: TypeKey,
    pub(crate) shapes: Vec<DataObjectKind>,
    pub(crate) inheritance: Vec<Inheritance>,
    pub(crate) builtin_rules: Vec<TypeKey>,
    pub(crate) custom_rules: Vec<RuleDraft>,
    pub(crate) fields: Vec<FieldDecl>,
    pub(crate) methods: Vec<MethodDecl>,
    pub(crate) constructor: fn() -> AnyValue,
}

impl ClassDeclaration {
    /// Rebinds every accessor so it operates on the root object reached
    /// through `projection`. The declared type stays the base type.
    pub(crate) fn lift(mut self, projection: &Projection, root: TypeKey) -> Self {
        let root = root.name();
        for field in &mut self.fields {
            field.accessor = projection.lift_accessor(&field.accessor, root);
            field.mutator = projection.lift_mutator(&field.mutator, root);
        }
        for method in &mut self.methods {
            method.body = match &method.body {
                MethodBody::Get(accessor) => {
                    MethodBody::Get(projection.lift_accessor(accessor, root))
                }
                MethodBody::Set(mutator) => MethodBody::Set(projection.lift_mutator(mutator, root)),
            };
        }
        self
    }
}

/// Declaration builder handed to [`DataObject::declare`].
pub struct Declaration<T> {
    raw: ClassDeclaration,
    _marker: PhantomData<fn(T)>,
}

impl<T: DataObject> Declaration<T> {
    fn new() -> Self {
        Self {
            raw: ClassDeclaration {
                data_type: TypeKey::data_object::<T>(),
                shapes: Vec::new(),
                inheritance: Vec::new(),
                builtin_rules: Vec::new(),
                custom_rules: Vec::new(),
                fields: Vec::new(),
                methods: Vec::new(),
                constructor: construct_erased::<T>,
            },
            _marker: PhantomData,
        }
    }

    /// Single-key shape.
    pub fn unique(&mut self) -> &mut Self {
        self.raw.shapes.push(DataObjectKind::Unique);
        self
    }

    /// Primary key plus secondary keys shape.
    pub fn multiple(&mut self) -> &mut Self {
        self.raw.shapes.push(DataObjectKind::Multiple);
        self
    }

    /// Keyless composite embedded in other data objects.
    pub fn element(&mut self) -> &mut Self {
        self.raw.shapes.push(DataObjectKind::Element);
        self
    }

    /// Inherits the declarations of the embedded base `B`.
    ///
    /// Base declarations are processed first; derived declarations may
    /// override base getters and setters.
    pub fn inherit<B: DataObject>(
        &mut self,
        project: fn(&T) -> &B,
        project_mut: fn(&mut T) -> &mut B,
    ) -> &mut Self {
        self.raw.inheritance.push(Inheritance {
            base: TypeKey::data_object::<B>(),
            projection: Projection::new(project, project_mut),
        });
        self
    }

    /// Uses the interpreter's built-in rule for values of type `V`.
    pub fn builtin_expand_rule<V: Any>(&mut self) -> &mut Self {
        self.raw.builtin_rules.push(TypeKey::of::<V>());
        self
    }

    /// Declares a class-wide rule for values of type `V`.
    pub fn custom_expand_rule<V: Any>(&mut self, rule: ExpandRuleBuilder<V>) -> &mut Self {
        self.raw.custom_rules.push(rule.into_draft());
        self
    }

    fn push_field<V>(&mut self, field: FieldDecl) -> FieldDeclaration<'_, V> {
        self.raw.fields.push(field);
        let len = self.raw.fields.len();
        FieldDeclaration {
            field: &mut self.raw.fields[len - 1],
            _marker: PhantomData,
        }
    }

    fn plain(
        name: &str,
        value_type: TypeKey,
        accessor: Accessor,
        mutator: Mutator,
        constructor: Option<Constructor>,
    ) -> FieldDecl {
        FieldDecl {
            name: name.to_string(),
            value_type,
            structure: Structure::Value,
            container: None,
            accessor,
            mutator,
            roles: Vec::new(),
            constructor,
            signature: None,
            metadata: ValueMetadata::default(),
            expandable: None,
        }
    }

    fn container(
        name: &str,
        value_type: TypeKey,
        structure: Structure,
        ops: ContainerOps,
        accessor: Accessor,
        mutator: Mutator,
        constructor: Constructor,
    ) -> FieldDecl {
        FieldDecl {
            structure,
            container: Some(ops),
            ..Self::plain(name, value_type, accessor, mutator, Some(constructor))
        }
    }

    /// A non-nullable scalar or opaque field.
    ///
    /// Fields without a key or value role are not part of the data object.
    pub fn field<V: Any + Send + Clone>(
        &mut self,
        name: &str,
        get: fn(&T) -> &V,
        get_mut: fn(&mut T) -> &mut V,
    ) -> FieldDeclaration<'_, V> {
        let field = Self::plain(
            name,
            TypeKey::of::<V>(),
            Accessor::field(get),
            Mutator::field(get_mut),
            None,
        );
        self.push_field(field)
    }

    /// A nullable scalar or opaque field.
    ///
    /// An absent value that gets pulled through an expand rule starts from
    /// `V::default()` unless another constructor is declared.
    pub fn optional_field<V: Any + Send + Clone + Default>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Option<V>,
        get_mut: fn(&mut T) -> &mut Option<V>,
    ) -> FieldDeclaration<'_, V> {
        let mut field = Self::plain(
            name,
            TypeKey::of::<V>(),
            Accessor::optional_field(get),
            Mutator::optional_field(get_mut),
            Some(Constructor::default_of::<V>()),
        );
        field.metadata.optional = true;
        self.push_field(field)
    }

    /// A nested element data object stored in flattened columns.
    pub fn element_field<E: DataObject + Clone>(
        &mut self,
        name: &str,
        get: fn(&T) -> &E,
        get_mut: fn(&mut T) -> &mut E,
    ) -> FieldDeclaration<'_, E> {
        let field = Self::plain(
            name,
            TypeKey::data_object::<E>(),
            Accessor::field(get),
            Mutator::field(get_mut),
            Some(Constructor::default_of::<E>()),
        );
        self.push_field(field)
    }

    pub fn optional_element_field<E: DataObject + Clone>(
        &mut self,
        name: &str,
        get: fn(&T) -> &Option<E>,
        get_mut: fn(&mut T) -> &mut Option<E>,
    ) -> FieldDeclaration<'_, E> {
        let mut field = Self::plain(
            name,
            TypeKey::data_object::<E>(),
            Accessor::optional_field(get),
            Mutator::optional_field(get_mut),
            Some(Constructor::default_of::<E>()),
        );
        field.metadata.optional = true;
        self.push_field(field)
    }

    /// A map stored in a synthetic collection table. Needs a two-slot
    /// signature (key type, value type).
    pub fn map_field<M: MapContainer>(
        &mut self,
        name: &str,
        get: fn(&T) -> &M,
        get_mut: fn(&mut T) -> &mut M,
    ) -> FieldDeclaration<'_, M> {
        let field = Self::container(
            name,
            TypeKey::of::<M>(),
            Structure::Map,
            ContainerOps::map::<M>(),
            Accessor::field(get),
            Mutator::field(get_mut),
            Constructor::default_of::<M>().always(),
        );
        self.push_field(field)
    }

    /// A set stored in a synthetic collection table. Needs a one-slot signature.
    pub fn set_field<S: SetContainer>(
        &mut self,
        name: &str,
        get: fn(&T) -> &S,
        get_mut: fn(&mut T) -> &mut S,
    ) -> FieldDeclaration<'_, S> {
        let field = Self::container(
            name,
            TypeKey::of::<S>(),
            Structure::Set,
            ContainerOps::set::<S>(),
            Accessor::field(get),
            Mutator::field(get_mut),
            Constructor::default_of::<S>().always(),
        );
        self.push_field(field)
    }

    /// A list stored in a synthetic collection table. Needs a one-slot signature.
    pub fn list_field<L: ListContainer>(
        &mut self,
        name: &str,
        get: fn(&T) -> &L,
        get_mut: fn(&mut T) -> &mut L,
    ) -> FieldDeclaration<'_, L> {
        let field = Self::container(
            name,
            TypeKey::of::<L>(),
            Structure::List,
            ContainerOps::list::<L>(),
            Accessor::field(get),
            Mutator::field(get_mut),
            Constructor::default_of::<L>().always(),
        );
        self.push_field(field)
    }

    /// Declares a getter or setter method.
    pub fn method(&mut self, name: &str, method: Method<T>) -> MethodDeclaration<'_> {
        self.raw.methods.push(MethodDecl {
            name: name.to_string(),
            signature: method.signature,
            body: method.body,
            markers: Vec::new(),
        });
        let len = self.raw.methods.len();
        MethodDeclaration {
            method: &mut self.raw.methods[len - 1],
        }
    }
}

/// Roles and metadata of one declared field.
pub struct FieldDeclaration<'a, V> {
    field: &'a mut FieldDecl,
    _marker: PhantomData<fn(V)>,
}

impl<V: Any + Send> FieldDeclaration<'_, V> {
    /// Key of a unique data object. An empty name falls back to the field name.
    pub fn key(self, name: &str) -> Self {
        self.field.roles.push(FieldRole::Key(name.to_string()));
        self
    }

    pub fn primary_key(self, name: &str) -> Self {
        self.field.roles.push(FieldRole::PrimaryKey(name.to_string()));
        self
    }

    pub fn secondary_key(self, name: &str) -> Self {
        self.field
            .roles
            .push(FieldRole::SecondaryKey(name.to_string()));
        self
    }

    /// Plain value. An empty name falls back to the field name.
    pub fn value(self, name: &str) -> Self {
        self.field.roles.push(FieldRole::Value(name.to_string()));
        self
    }

    pub fn not_null(self) -> Self {
        self.field.metadata.not_null = true;
        self
    }

    /// Expands the value even when its type has a native column.
    pub fn expand_forcibly(self) -> Self {
        self.field.metadata.expand_forcibly = true;
        self
    }

    /// Expands this field with its own rule.
    pub fn expandable(self, rule: ExpandRuleBuilder<V>) -> Self {
        self.field.expandable = Some(rule.into_draft());
        self
    }

    /// Generic slots of a container field, consumed left to right.
    pub fn signature(self, slots: &[TypeKey]) -> Self {
        self.field.signature = Some(slots.to_vec());
        self
    }

    /// Constructs the value when it is absent.
    pub fn constructor(self, make: fn() -> V) -> Self {
        let always = self
            .field
            .constructor
            .as_ref()
            .map(|c| c.is_always())
            .unwrap_or(false);
        let constructor = Constructor::new(make);
        self.field.constructor = Some(if always {
            constructor.always()
        } else {
            constructor
        });
        self
    }

    /// Runs the constructor even when a value is present.
    pub fn always_construct(self) -> Self {
        self.field.constructor = self.field.constructor.take().map(Constructor::always);
        self
    }
}

/// Markers of one declared method.
pub struct MethodDeclaration<'a> {
    method: &'a mut MethodDecl,
}

impl MethodDeclaration<'_> {
    /// Reads value `name` through this method.
    pub fn getter(self, name: &str) -> Self {
        self.mark(MethodMarker::Getter(name.to_string()))
    }

    pub fn setter(self, name: &str) -> Self {
        self.mark(MethodMarker::Setter(name.to_string()))
    }

    /// Replaces a base getter of value `name`. Requires inheritance.
    pub fn override_getter(self, name: &str) -> Self {
        self.mark(MethodMarker::OverrideGetter(name.to_string()))
    }

    pub fn override_setter(self, name: &str) -> Self {
        self.mark(MethodMarker::OverrideSetter(name.to_string()))
    }

    /// Takes the value name from the ancestor getter with the same name and
    /// parameters. A non-empty `pinned` name must match it.
    pub fn inherited_getter(self, pinned: &str) -> Self {
        self.mark(MethodMarker::InheritedGetter(pinned.to_string()))
    }

    pub fn inherited_setter(self, pinned: &str) -> Self {
        self.mark(MethodMarker::InheritedSetter(pinned.to_string()))
    }

    fn mark(self, marker: MethodMarker) -> Self {
        self.method.markers.push(marker);
        self
    }
}
