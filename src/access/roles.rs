//! Roles, role sets and the console module table.

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A permission tag attached to an authenticated identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// PowerDesk administrator; passes every gate.
    Powerdesk,
    Dealer,
    Sales,
    Finance,
    Marketing,
    Support,
    Customer,
}

impl Role {
    pub const ALL: [Role; 7] = [
        Role::Powerdesk,
        Role::Dealer,
        Role::Sales,
        Role::Finance,
        Role::Marketing,
        Role::Support,
        Role::Customer,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::Powerdesk => "powerdesk",
            Role::Dealer => "dealer",
            Role::Sales => "sales",
            Role::Finance => "finance",
            Role::Marketing => "marketing",
            Role::Support => "support",
            Role::Customer => "customer",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Role::ALL
            .into_iter()
            .find(|role| role.as_str().eq_ignore_ascii_case(s.trim()))
    }

    fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

/// Unordered set of roles, stored as a bitset.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct RoleSet(u16);

impl RoleSet {
    pub const fn empty() -> Self {
        RoleSet(0)
    }

    /// Build a set from stored tags, dropping the ones that name no known role.
    pub fn from_tags<I, S>(tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        tags.into_iter()
            .filter_map(|tag| {
                let tag = tag.as_ref();
                let role = Role::parse(tag);
                if role.is_none() {
                    tracing::warn!("Ignoring unknown role tag {:?}", tag);
                }
                role
            })
            .collect()
    }

    pub fn insert(&mut self, role: Role) {
        self.0 |= role.bit();
    }

    pub fn contains(&self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    pub fn is_empty(&self) -> bool {
        self.0 == 0
    }

    pub fn is_superadmin(&self) -> bool {
        self.contains(Role::Powerdesk)
    }

    /// True when the two sets share at least one role.
    pub fn any_of(&self, allowed: RoleSet) -> bool {
        self.0 & allowed.0 != 0
    }

    /// True when every role in `required` is held.
    pub fn all_of(&self, required: RoleSet) -> bool {
        self.0 & required.0 == required.0
    }

    pub fn iter(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL.into_iter().filter(|role| self.contains(*role))
    }

    pub fn to_tags(&self) -> Vec<&'static str> {
        self.iter().map(|role| role.as_str()).collect()
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        let mut set = RoleSet::empty();
        for role in iter {
            set.insert(role);
        }
        set
    }
}

impl<const N: usize> From<[Role; N]> for RoleSet {
    fn from(roles: [Role; N]) -> Self {
        roles.into_iter().collect()
    }
}

impl Serialize for RoleSet {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for RoleSet {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let roles = Vec::<Role>::deserialize(deserializer)?;
        Ok(roles.into_iter().collect())
    }
}

/// Areas of the app that are gated by role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Module {
    Dashboard,
    Listings,
    Leads,
    Finance,
    Subscriptions,
    Analytics,
    DealerDashboard,
    DealerOnboarding,
    UserManagement,
}

impl Module {
    /// Roles allowed into the module. The super-admin is implied everywhere.
    pub fn allowed_roles(&self) -> RoleSet {
        match self {
            Module::Dashboard => RoleSet::from([
                Role::Dealer,
                Role::Sales,
                Role::Finance,
                Role::Marketing,
                Role::Support,
            ]),
            Module::Listings => RoleSet::from([Role::Dealer, Role::Sales]),
            Module::Leads => RoleSet::from([Role::Dealer, Role::Sales]),
            Module::Finance => RoleSet::from([Role::Finance]),
            Module::Subscriptions => RoleSet::from([Role::Finance, Role::Sales]),
            Module::Analytics => RoleSet::from([Role::Marketing, Role::Sales]),
            Module::DealerDashboard => RoleSet::from([Role::Dealer]),
            Module::DealerOnboarding => RoleSet::from([Role::Sales, Role::Support]),
            Module::UserManagement => RoleSet::empty(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_is_case_insensitive() {
        assert_eq!(Role::parse("PowerDesk"), Some(Role::Powerdesk));
        assert_eq!(Role::parse(" dealer "), Some(Role::Dealer));
        assert_eq!(Role::parse("janitor"), None);
    }

    #[test]
    fn test_from_tags_drops_unknown() {
        let set = RoleSet::from_tags(["sales", "janitor", "finance"]);
        assert_eq!(set, RoleSet::from([Role::Sales, Role::Finance]));
    }

    #[test]
    fn test_order_does_not_matter() {
        let a = RoleSet::from_tags(["finance", "dealer", "sales"]);
        let b = RoleSet::from_tags(["sales", "finance", "dealer"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_any_and_all() {
        let held = RoleSet::from([Role::Dealer, Role::Sales]);
        assert!(held.any_of(RoleSet::from([Role::Sales, Role::Finance])));
        assert!(!held.any_of(RoleSet::from([Role::Finance])));
        assert!(held.all_of(RoleSet::from([Role::Dealer])));
        assert!(!held.all_of(RoleSet::from([Role::Dealer, Role::Finance])));
        assert!(held.all_of(RoleSet::empty()));
        assert!(!held.any_of(RoleSet::empty()));
    }

    #[test]
    fn test_serializes_as_tag_list() {
        let set = RoleSet::from([Role::Sales, Role::Powerdesk]);
        let json = serde_json::to_value(set).unwrap();
        assert_eq!(json, serde_json::json!(["powerdesk", "sales"]));

        let back: RoleSet = serde_json::from_value(json).unwrap();
        assert_eq!(back, set);
    }

    #[test]
    fn test_user_management_is_superadmin_only() {
        assert!(Module::UserManagement.allowed_roles().is_empty());
    }
}
