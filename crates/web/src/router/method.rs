use http::Method;
use std::ops::BitOr;

/// A set of request methods a route accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MethodSet(u8);

impl MethodSet {
    pub const GET: MethodSet = MethodSet(1);
    pub const POST: MethodSet = MethodSet(1 << 1);
    pub const DELETE: MethodSet = MethodSet(1 << 2);
    pub const PUT: MethodSet = MethodSet(1 << 3);
    pub const PATCH: MethodSet = MethodSet(1 << 4);
    pub const HEAD: MethodSet = MethodSet(1 << 5);
    pub const OPTIONS: MethodSet = MethodSet(1 << 6);
    pub const ANY: MethodSet = MethodSet(0x7f);

    /// Methods the decoder does not accept map to the empty set.
    pub fn of(method: &Method) -> MethodSet {
        match *method {
            Method::GET => Self::GET,
            Method::POST => Self::POST,
            Method::DELETE => Self::DELETE,
            Method::PUT => Self::PUT,
            Method::PATCH => Self::PATCH,
            Method::HEAD => Self::HEAD,
            Method::OPTIONS => Self::OPTIONS,
            _ => MethodSet(0),
        }
    }

    pub fn contains(self, method: &Method) -> bool {
        let bit = Self::of(method).0;
        bit != 0 && self.0 & bit == bit
    }
}

impl BitOr for MethodSet {
    type Output = MethodSet;

    fn bitor(self, rhs: Self) -> Self::Output {
        MethodSet(self.0 | rhs.0)
    }
}

impl From<Method> for MethodSet {
    fn from(method: Method) -> Self {
        Self::of(&method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contains() {
        let set = MethodSet::GET | MethodSet::POST;
        assert!(set.contains(&Method::GET));
        assert!(set.contains(&Method::POST));
        assert!(!set.contains(&Method::PUT));

        assert!(MethodSet::ANY.contains(&Method::OPTIONS));
        assert!(!MethodSet::ANY.contains(&Method::TRACE));
        assert_eq!(MethodSet::from(Method::DELETE), MethodSet::DELETE);
    }
}
