//! The slice of the standard library that loaded sources can refer to:
//! `builtins`, `typing`, `abc`, `enum`, `functools` and `dataclasses`.

use indexmap::IndexMap;

use super::{mro, Arena, BuiltinCallable, ClassObject, ModuleObject, ObjectId, Origin, ParamDecl, ParamKind, PyObject, ValueKind, ValueObject};
use crate::core::syntax::python_str_repr;

pub const OBJECT_DOC: &str = "The base class of the class hierarchy.\n\nWhen called, it accepts no arguments and returns a new featureless\ninstance that has no instance attributes and cannot be given any.\n";
pub const OBJECT_INIT_DOC: &str = "Initialize self.  See help(type(self)) for accurate signature.";
pub const OBJECT_NEW_DOC: &str = "Create and return a new object.  See help(type) for accurate signature.";
pub const TYPE_CALL_DOC: &str = "Call self as a function.";
pub const TYPE_DOC: &str = "type(object) -> the object's type\ntype(name, bases, dict, **kwds) -> a new type";
pub const DICT_DOC: &str = "dict() -> new empty dictionary\ndict(mapping) -> new dictionary initialized from a mapping object's\n    (key, value) pairs\ndict(iterable) -> new dictionary initialized as if via:\n    d = {}\n    for k, v in iterable:\n        d[k] = v\ndict(**kwargs) -> new dictionary initialized with the name=value pairs\n    in the keyword argument list.  For example:  dict(one=1, two=2)";
const ENUM_DOC: &str = "Create a collection of name/value pairs.";
const ENUM_META_CALL_DOC: &str = "Either returns an existing member, or creates a new enum class.";
const ABC_DOC: &str = "Helper class that provides a standard way to create an ABC using\ninheritance.";
const ABC_META_DOC: &str = "Metaclass for defining Abstract Base Classes (ABCs).";
const GENERIC_DOC: &str = "Abstract base class for generic types.";
const CACHED_PROPERTY_DOC: &str = "Transform a method into a property whose value is computed once.";
const PROPERTY_DOC: &str = "Property attribute.";
const BASE_EXCEPTION_DOC: &str = "Common base class for all exceptions";
const EXCEPTION_DOC: &str = "Common base class for all non-exit exceptions.";

/// Well-known objects the loader and the resolvers compare against
#[derive(Debug, Clone)]
pub struct Builtins {
    pub builtins_module: ObjectId,
    pub object: ObjectId,
    pub type_: ObjectId,
    pub dict: ObjectId,
    pub str_: ObjectId,
    pub int: ObjectId,
    pub float: ObjectId,
    pub bool_: ObjectId,
    pub list: ObjectId,
    pub tuple: ObjectId,
    pub property: ObjectId,
    pub classmethod: ObjectId,
    pub staticmethod: ObjectId,
    pub cached_property: ObjectId,
    pub object_init: ObjectId,
    pub object_new: ObjectId,
    pub type_call: ObjectId,
    pub enum_: ObjectId,
    pub enum_meta: ObjectId,
    pub abc_meta: ObjectId,
    pub abstractmethod: ObjectId,
    pub generic: ObjectId,
    pub class_var: ObjectId,
    pub type_var: ObjectId,
}

impl Builtins {
    pub(crate) fn install(arena: &mut Arena) -> Self {
        // object and type refer to each other
        let object = new_class(arena, "builtins", "object", &[], None);
        let type_ = new_class(arena, "builtins", "type", &[object], None);
        for id in [object, type_] {
            if let Some(class) = arena.class_mut(id) {
                class.metaclass = Some(type_);
            }
        }
        let str_ = new_class(arena, "builtins", "str", &[object], Some(type_));

        let object_init = callable(arena, "builtins", "object.__init__", Some(OBJECT_INIT_DOC), Some(self_args_kwargs()));
        let object_new = callable(
            arena,
            "builtins",
            "object.__new__",
            Some(OBJECT_NEW_DOC),
            Some(vec![ParamDecl::new("args", ParamKind::VarPositional), ParamDecl::new("kwargs", ParamKind::VarKeyword)]),
        );
        set_attr(arena, object, "__init__", object_init);
        set_attr(arena, object, "__new__", object_new);
        set_doc(arena, str_, object, OBJECT_DOC);

        let type_call = callable(arena, "builtins", "type.__call__", Some(TYPE_CALL_DOC), Some(self_args_kwargs()));
        let type_init = callable(arena, "builtins", "type.__init__", Some(OBJECT_INIT_DOC), Some(self_args_kwargs()));
        set_attr(arena, type_, "__call__", type_call);
        set_attr(arena, type_, "__init__", type_init);
        set_doc(arena, str_, type_, TYPE_DOC);

        let class = |arena: &mut Arena, name: &str, bases: &[ObjectId]| new_class(arena, "builtins", name, bases, Some(type_));
        let int = class(arena, "int", &[object]);
        let float = class(arena, "float", &[object]);
        let complex = class(arena, "complex", &[object]);
        let bool_ = class(arena, "bool", &[int]);
        let bytes = class(arena, "bytes", &[object]);
        let list = class(arena, "list", &[object]);
        let tuple = class(arena, "tuple", &[object]);
        let set = class(arena, "set", &[object]);
        let frozenset = class(arena, "frozenset", &[object]);
        let range = class(arena, "range", &[object]);

        let dict = class(arena, "dict", &[object]);
        let dict_init = callable(arena, "builtins", "dict.__init__", Some(OBJECT_INIT_DOC), Some(self_args_kwargs()));
        let dict_new = callable(arena, "builtins", "dict.__new__", Some(OBJECT_NEW_DOC), None);
        set_attr(arena, dict, "__init__", dict_init);
        set_attr(arena, dict, "__new__", dict_new);
        set_doc(arena, str_, dict, DICT_DOC);

        let property = class(arena, "property", &[object]);
        set_doc(arena, str_, property, PROPERTY_DOC);
        let classmethod = class(arena, "classmethod", &[object]);
        let staticmethod = class(arena, "staticmethod", &[object]);

        let base_exception = class(arena, "BaseException", &[object]);
        let exception_init = callable(arena, "builtins", "BaseException.__init__", Some(OBJECT_INIT_DOC), Some(self_args_kwargs()));
        set_attr(arena, base_exception, "__init__", exception_init);
        set_doc(arena, str_, base_exception, BASE_EXCEPTION_DOC);
        let exception = class(arena, "Exception", &[base_exception]);
        set_doc(arena, str_, exception, EXCEPTION_DOC);
        let mut exceptions = vec![("BaseException", base_exception), ("Exception", exception)];
        for name in ["ValueError", "TypeError", "KeyError", "RuntimeError", "AttributeError", "LookupError", "NotImplementedError", "OSError"] {
            exceptions.push((name, class(arena, name, &[exception])));
        }

        let mut builtin_members: Vec<(&str, ObjectId)> = vec![
            ("object", object),
            ("type", type_),
            ("str", str_),
            ("int", int),
            ("float", float),
            ("complex", complex),
            ("bool", bool_),
            ("bytes", bytes),
            ("list", list),
            ("tuple", tuple),
            ("set", set),
            ("frozenset", frozenset),
            ("range", range),
            ("dict", dict),
            ("property", property),
            ("classmethod", classmethod),
            ("staticmethod", staticmethod),
        ];
        builtin_members.extend(exceptions);
        for name in ["len", "print", "isinstance", "issubclass", "getattr", "setattr", "super", "repr", "sorted"] {
            let id = callable(arena, "builtins", name, None, None);
            builtin_members.push((name, id));
        }
        let builtins_module = new_module(arena, "builtins", None, &builtin_members);

        // abc
        let abc_meta = new_class(arena, "abc", "ABCMeta", &[type_], Some(type_));
        set_doc(arena, str_, abc_meta, ABC_META_DOC);
        let abc = new_class(arena, "abc", "ABC", &[object], Some(abc_meta));
        set_doc(arena, str_, abc, ABC_DOC);
        let abstractmethod = callable(arena, "abc", "abstractmethod", Some("A decorator indicating abstract methods."), None);
        new_module(arena, "abc", None, &[("ABC", abc), ("ABCMeta", abc_meta), ("abstractmethod", abstractmethod)]);

        // enum
        let enum_meta = new_class(arena, "enum", "EnumType", &[type_], Some(type_));
        let enum_call = callable(arena, "enum", "EnumType.__call__", Some(ENUM_META_CALL_DOC), None);
        set_attr(arena, enum_meta, "__call__", enum_call);
        let enum_ = new_class(arena, "enum", "Enum", &[object], Some(enum_meta));
        let enum_init = callable(arena, "enum", "Enum.__init__", None, None);
        let enum_new = callable(arena, "enum", "Enum.__new__", None, None);
        set_attr(arena, enum_, "__init__", enum_init);
        set_attr(arena, enum_, "__new__", enum_new);
        set_doc(arena, str_, enum_, ENUM_DOC);
        let int_enum = new_class(arena, "enum", "IntEnum", &[int, enum_], Some(enum_meta));
        let str_enum = new_class(arena, "enum", "StrEnum", &[str_, enum_], Some(enum_meta));
        let flag = new_class(arena, "enum", "Flag", &[enum_], Some(enum_meta));
        let int_flag = new_class(arena, "enum", "IntFlag", &[int, flag], Some(enum_meta));
        let auto = new_class(arena, "enum", "auto", &[object], Some(type_));
        new_module(
            arena,
            "enum",
            None,
            &[
                ("Enum", enum_),
                ("IntEnum", int_enum),
                ("StrEnum", str_enum),
                ("Flag", flag),
                ("IntFlag", int_flag),
                ("EnumMeta", enum_meta),
                ("EnumType", enum_meta),
                ("auto", auto),
            ],
        );

        // functools
        let cached_property = new_class(arena, "functools", "cached_property", &[object], Some(type_));
        set_doc(arena, str_, cached_property, CACHED_PROPERTY_DOC);
        let mut functools_members = vec![("cached_property", cached_property)];
        for name in ["wraps", "lru_cache", "cache", "partial", "total_ordering", "singledispatch", "reduce"] {
            functools_members.push((name, callable(arena, "functools", name, None, None)));
        }
        new_module(arena, "functools", None, &functools_members);

        // dataclasses
        let dataclass = callable(arena, "dataclasses", "dataclass", None, None);
        let field = callable(arena, "dataclasses", "field", None, None);
        new_module(arena, "dataclasses", None, &[("dataclass", dataclass), ("field", field)]);

        // typing
        let generic = new_class(arena, "typing", "Generic", &[object], Some(type_));
        set_doc(arena, str_, generic, GENERIC_DOC);
        let protocol = new_class(arena, "typing", "Protocol", &[generic], Some(abc_meta));
        let type_var = callable(arena, "typing", "TypeVar", Some("Type variable."), None);
        let special = |arena: &mut Arena, name: &str, runtime: Option<ObjectId>| {
            arena.alloc(PyObject::SpecialForm {
                name: name.to_string(),
                runtime,
            })
        };
        let class_var = special(arena, "ClassVar", None);
        let mut typing_members: Vec<(&str, ObjectId)> = vec![
            ("Generic", generic),
            ("Protocol", protocol),
            ("TypeVar", type_var),
            ("ClassVar", class_var),
        ];
        for (name, runtime) in [
            ("Any", None),
            ("Final", None),
            ("Optional", None),
            ("Union", None),
            ("Literal", None),
            ("Annotated", None),
            ("Callable", None),
            ("Iterable", None),
            ("Iterator", None),
            ("Sequence", None),
            ("Mapping", None),
            ("MutableMapping", None),
            ("List", Some(list)),
            ("Dict", Some(dict)),
            ("Tuple", Some(tuple)),
            ("Set", Some(set)),
            ("FrozenSet", Some(frozenset)),
            ("Type", Some(type_)),
        ] {
            typing_members.push((name, special(arena, name, runtime)));
        }
        for name in ["final", "overload", "cast", "NewType", "runtime_checkable"] {
            typing_members.push((name, callable(arena, "typing", name, None, None)));
        }
        let type_checking = arena.alloc(PyObject::Value(ValueObject {
            class: Some(bool_),
            repr: Some("False".to_string()),
            kind: ValueKind::Literal,
        }));
        typing_members.push(("TYPE_CHECKING", type_checking));
        new_module(arena, "typing", None, &typing_members);

        Self {
            builtins_module,
            object,
            type_,
            dict,
            str_,
            int,
            float,
            bool_,
            list,
            tuple,
            property,
            classmethod,
            staticmethod,
            cached_property,
            object_init,
            object_new,
            type_call,
            enum_,
            enum_meta,
            abc_meta,
            abstractmethod,
            generic,
            class_var,
            type_var,
        }
    }
}

fn self_args_kwargs() -> Vec<ParamDecl> {
    vec![
        ParamDecl::new("self", ParamKind::PositionalOnly),
        ParamDecl::new("args", ParamKind::VarPositional),
        ParamDecl::new("kwargs", ParamKind::VarKeyword),
    ]
}

fn new_class(arena: &mut Arena, module: &str, name: &str, bases: &[ObjectId], metaclass: Option<ObjectId>) -> ObjectId {
    let id = arena.alloc(PyObject::Class(ClassObject {
        name: name.to_string(),
        qualname: name.to_string(),
        module: module.to_string(),
        doc: None,
        bases: bases.to_vec(),
        orig_bases: None,
        metaclass,
        mro: Vec::new(),
        dict: IndexMap::new(),
        annotations: IndexMap::new(),
        decorators: Vec::new(),
        namespace: None,
        origin: Origin::Builtin,
    }));
    let mro = mro::linearize(arena, id, bases).unwrap_or_else(|_| mro::fallback(arena, id, bases));
    if let Some(class) = arena.class_mut(id) {
        class.mro = mro;
    }
    id
}

fn callable(arena: &mut Arena, module: &str, qualname: &str, doc: Option<&str>, parameters: Option<Vec<ParamDecl>>) -> ObjectId {
    let name = qualname.rsplit('.').next().unwrap_or(qualname).to_string();
    arena.alloc(PyObject::Builtin(BuiltinCallable {
        name,
        qualname: qualname.to_string(),
        module: module.to_string(),
        doc: doc.map(str::to_string),
        parameters,
    }))
}

fn set_attr(arena: &mut Arena, class: ObjectId, name: &str, value: ObjectId) {
    if let Some(class) = arena.class_mut(class) {
        class.dict.insert(name.to_string(), value);
    }
}

fn set_doc(arena: &mut Arena, str_class: ObjectId, class: ObjectId, doc: &str) {
    let value = arena.alloc(PyObject::Value(ValueObject {
        class: Some(str_class),
        repr: Some(python_str_repr(doc)),
        kind: ValueKind::Str(doc.to_string()),
    }));
    if let Some(class) = arena.class_mut(class) {
        class.doc = Some(doc.to_string());
        class.dict.insert("__doc__".to_string(), value);
    }
}

fn new_module(arena: &mut Arena, name: &str, doc: Option<&str>, members: &[(&str, ObjectId)]) -> ObjectId {
    arena.register_module(ModuleObject {
        name: name.to_string(),
        doc: doc.map(str::to_string),
        dict: members.iter().map(|(k, v)| (k.to_string(), *v)).collect(),
        annotations: IndexMap::new(),
        package_dir: None,
        source: None,
        origin: Origin::Builtin,
    })
}
