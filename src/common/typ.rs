/// A type of the language
///
/// `Void` is only legal as a function return type (and as the result of a
/// call to a `void` function). `Unknown` is what the type checker assigns
/// to expressions it could not type; it suppresses follow-up errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Type {
    Int,
    Float,
    Bool,
    String,
    Void,
    Unknown,
}

impl Type {
    /// Look up a type by its source-level name
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "int" => Some(Type::Int),
            "float" => Some(Type::Float),
            "bool" => Some(Type::Bool),
            "string" => Some(Type::String),
            "void" => Some(Type::Void),
            _ => None,
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, Type::Int | Type::Float)
    }

    /// Whether a value of type `source` may be assigned to a target of this type
    ///
    /// Numeric types are compatible in both directions; the lowerer inserts
    /// the conversion when the operand types differ.
    pub fn accepts(self, source: Type) -> bool {
        match self {
            Type::Int | Type::Float => source.is_numeric(),
            Type::Bool => source == Type::Bool,
            Type::String => source == Type::String,
            Type::Void | Type::Unknown => false,
        }
    }
}

impl std::fmt::Display for Type {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Type::Int => write!(f, "int"),
            Type::Float => write!(f, "float"),
            Type::Bool => write!(f, "bool"),
            Type::String => write!(f, "string"),
            Type::Void => write!(f, "void"),
            Type::Unknown => write!(f, "unknown"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn name_round_trip() {
        for name in ["int", "float", "bool", "string", "void"] {
            assert_eq!(Type::from_name(name).unwrap().to_string(), name);
        }
        assert!(Type::from_name("char").is_none());
    }

    #[test]
    fn numeric_compatibility_is_bidirectional() {
        assert!(Type::Int.accepts(Type::Float));
        assert!(Type::Float.accepts(Type::Int));
        assert!(!Type::Int.accepts(Type::Bool));
        assert!(!Type::String.accepts(Type::Int));
        assert!(Type::String.accepts(Type::String));
    }
}
