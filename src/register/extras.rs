//! Registration extras supplied next to the class type

use super::class::ExtensionClass;
use super::docs::ClassDocs;
use super::method::{FunctionKind, IntoFunction};

/// Additional declarations passed to [`Bridge::register`](crate::Bridge::register)
pub enum Extra<T: ExtensionClass> {
    /// Class and member descriptions
    Docs(ClassDocs),
    /// Integer constants
    Constants(Vec<(String, i64)>),
    /// Static method, or the designated constructor when the name starts
    /// with `new`/`New` and the function is `Fn(Base) -> T`
    Function(Function<T>),
}

impl<T: ExtensionClass> Extra<T> {
    pub fn function<M>(name: impl Into<String>, f: impl IntoFunction<T, M>) -> Self {
        let name = name.into();
        let kind = f.into_function(&name);
        Extra::Function(Function {
            name,
            doc: None,
            kind,
        })
    }

    pub fn constants<K: Into<String>>(constants: impl IntoIterator<Item = (K, i64)>) -> Self {
        Extra::Constants(
            constants
                .into_iter()
                .map(|(name, value)| (name.into(), value))
                .collect(),
        )
    }

    /// Attach a description to a [`Extra::Function`]; other extras are unchanged
    pub fn doc(self, text: impl Into<String>) -> Self {
        match self {
            Extra::Function(mut function) => {
                function.doc = Some(text.into());
                Extra::Function(function)
            }
            other => other,
        }
    }
}

/// Named function extra
pub struct Function<T: ExtensionClass> {
    name: String,
    doc: Option<String>,
    kind: FunctionKind<T>,
}

impl<T: ExtensionClass> Function<T> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn into_parts(self) -> (String, Option<String>, FunctionKind<T>) {
        (self.name, self.doc, self.kind)
    }
}
