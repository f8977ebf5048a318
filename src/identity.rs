use std::borrow::Cow;
use std::collections::HashSet;
use std::fmt::{Display, Formatter};

/// An opaque role tag required by a [`Transition`] and carried by an
/// [`Identity`]. Capabilities are compared by equality only; the engine
/// attaches no meaning to their content.
///
/// [`Transition`]: crate::Transition
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Capability(Cow<'static, str>);

impl Capability {
    pub fn new(tag: impl Into<Cow<'static, str>>) -> Self {
        Self(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The identity acting on a command, together with the capabilities it has
/// been granted. Issuance and verification of identities happen outside the
/// engine; by the time a command reaches the router the capability set is
/// taken at face value.
#[derive(Debug, Clone)]
pub struct Identity {
    name: String,
    capabilities: HashSet<Capability>,
}

impl Identity {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: HashSet::new(),
        }
    }

    /// Grants a capability, consuming and returning the identity so grants
    /// can be chained at construction time.
    #[must_use]
    pub fn grant(mut self, capability: Capability) -> Self {
        self.capabilities.insert(capability);
        self
    }

    pub fn can(&self, capability: &Capability) -> bool {
        self.capabilities.contains(capability)
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}
