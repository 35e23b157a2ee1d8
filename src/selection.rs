use regex::Regex;

use crate::error::Error;
use crate::options::AgentOptions;

/// Kind of routine declared on a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoutineKind {
    Method,
    Constructor,
}

/// A routine as seen by the loader, before instrumentation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutineDecl {
    pub descriptor: String,
    pub kind: RoutineKind,
    pub is_native: bool,
    /// Method with no body to wrap.
    pub is_empty: bool,
}

impl RoutineDecl {
    pub fn method(descriptor: impl Into<String>) -> Self {
        Self {
            descriptor: descriptor.into(),
            kind: RoutineKind::Method,
            is_native: false,
            is_empty: false,
        }
    }

    pub fn constructor(descriptor: impl Into<String>) -> Self {
        Self {
            kind: RoutineKind::Constructor,
            ..Self::method(descriptor)
        }
    }
}

/// A type being loaded and its routines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeDecl {
    pub name: String,
    pub is_interface: bool,
    pub routines: Vec<RoutineDecl>,
}

impl TypeDecl {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            is_interface: false,
            routines: Vec::new(),
        }
    }
}

/// Instrumentation decision for one routine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Selection {
    pub is_constructor: bool,
    pub is_traced: bool,
}

/// Decides which routines get enter/exit hooks and which print live traces.
///
/// With no package pattern nothing is instrumented; with no trace pattern
/// nothing is traced.
#[derive(Debug, Clone)]
pub struct Selector {
    package: Option<Pattern>,
    traced: Option<Regex>,
}

#[derive(Debug, Clone)]
struct Pattern {
    anywhere: Regex,
    whole: Regex,
}

impl Selector {
    pub fn new(package: Option<&str>, traced: Option<&str>) -> Result<Self, Error> {
        let package = package
            .map(|p| {
                Ok::<_, Error>(Pattern {
                    anywhere: compile(p, p)?,
                    whole: compile(p, &format!("^(?:{p})$"))?,
                })
            })
            .transpose()?;
        let traced = traced.map(|t| compile(t, t)).transpose()?;
        Ok(Self { package, traced })
    }

    pub fn from_options(options: &AgentOptions) -> Result<Self, Error> {
        Self::new(
            options.package_pattern.as_deref(),
            options.trace_pattern.as_deref(),
        )
    }

    /// The whole type name must match the package pattern.
    pub fn allows_type(&self, type_name: &str) -> bool {
        self.package
            .as_ref()
            .is_some_and(|p| p.whole.is_match(type_name))
    }

    /// The package pattern must occur somewhere in the descriptor.
    pub fn allows_method(&self, descriptor: &str) -> bool {
        self.package
            .as_ref()
            .is_some_and(|p| p.anywhere.is_match(descriptor))
    }

    pub fn traces(&self, descriptor: &str) -> bool {
        self.traced.as_ref().is_some_and(|t| t.is_match(descriptor))
    }

    /// Decide a single routine of an already-allowed type.
    ///
    /// Native routines are never wrapped. Methods also need a body and a
    /// package match; constructors of an allowed type always qualify.
    pub fn select(&self, routine: &RoutineDecl) -> Option<Selection> {
        if routine.is_native {
            return None;
        }
        let is_constructor = match routine.kind {
            RoutineKind::Constructor => true,
            RoutineKind::Method => {
                if routine.is_empty || !self.allows_method(&routine.descriptor) {
                    return None;
                }
                false
            }
        };
        Some(Selection {
            is_constructor,
            is_traced: self.traces(&routine.descriptor),
        })
    }

    /// Routines of `decl` to instrument, in declaration order. Interfaces and
    /// types outside the package pattern yield nothing.
    pub fn select_type<'a>(
        &'a self,
        decl: &'a TypeDecl,
    ) -> impl Iterator<Item = (&'a RoutineDecl, Selection)> + 'a {
        let allowed = !decl.is_interface && self.allows_type(&decl.name);
        decl.routines
            .iter()
            .filter(move |_| allowed)
            .filter_map(move |r| self.select(r).map(|s| (r, s)))
    }
}

fn compile(pattern: &str, source: &str) -> Result<Regex, Error> {
    Regex::new(source).map_err(|source| Error::InvalidPattern {
        pattern: pattern.to_owned(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn selector() -> Selector {
        Selector::new(Some(r"com\.acme\..*"), Some("parse")).unwrap()
    }

    #[test]
    fn type_pattern_must_match_whole_name() {
        let s = Selector::new(Some(r"com\.acme"), None).unwrap();
        assert!(s.allows_type("com.acme"));
        assert!(!s.allows_type("com.acme.Parser"));
        assert!(!s.allows_type("org.com.acme"));
    }

    #[test]
    fn method_pattern_matches_anywhere() {
        let s = selector();
        assert!(s.allows_method("com.acme.Parser.parse(java.lang.String)"));
        assert!(!s.allows_method("org.other.Thing.run()"));
    }

    #[test]
    fn no_patterns_select_nothing() {
        let s = Selector::new(None, None).unwrap();
        assert!(!s.allows_type("com.acme.Parser"));
        assert!(!s.allows_method("com.acme.Parser.parse()"));
        assert!(!s.traces("com.acme.Parser.parse()"));
    }

    #[test]
    fn invalid_pattern_fails_fast() {
        let err = Selector::new(Some("com.(acme"), None).unwrap_err();
        assert!(
            err.to_string().contains("invalid pattern 'com.(acme'"),
            "unexpected error: {err}"
        );
        assert!(Selector::new(None, Some("[")).is_err());
    }

    #[test]
    fn native_and_empty_methods_are_skipped() {
        let s = selector();
        let native = RoutineDecl {
            is_native: true,
            ..RoutineDecl::method("com.acme.Io.read()")
        };
        let empty = RoutineDecl {
            is_empty: true,
            ..RoutineDecl::method("com.acme.Io.noop()")
        };
        assert_eq!(s.select(&native), None);
        assert_eq!(s.select(&empty), None);
        let native_ctor = RoutineDecl {
            is_native: true,
            ..RoutineDecl::constructor("com.acme.Io()")
        };
        assert_eq!(s.select(&native_ctor), None);
    }

    #[test]
    fn constructors_are_selected_with_trace_flag() {
        let s = Selector::new(Some(r"com\.acme\..*"), Some(r"Parser\(")).unwrap();
        let ctor = RoutineDecl::constructor("com.acme.Parser()");
        assert_eq!(
            s.select(&ctor),
            Some(Selection {
                is_constructor: true,
                is_traced: true
            })
        );
    }

    #[test]
    fn select_type_skips_interfaces_and_foreign_types() {
        let s = selector();
        let mut decl = TypeDecl::new("com.acme.Parser");
        decl.routines = vec![
            RoutineDecl::constructor("com.acme.Parser()"),
            RoutineDecl::method("com.acme.Parser.parse(java.lang.String)"),
            RoutineDecl::method("java.lang.Object.hashCode()"),
        ];
        let picked: Vec<(&str, bool)> = s
            .select_type(&decl)
            .map(|(r, sel)| (r.descriptor.as_str(), sel.is_traced))
            .collect();
        assert_eq!(
            picked,
            [
                ("com.acme.Parser()", false),
                ("com.acme.Parser.parse(java.lang.String)", true)
            ]
        );

        let interface = TypeDecl {
            is_interface: true,
            ..decl.clone()
        };
        assert_eq!(s.select_type(&interface).count(), 0);

        let foreign = TypeDecl {
            name: "org.other.Parser".into(),
            ..decl
        };
        assert_eq!(s.select_type(&foreign).count(), 0);
    }
}
