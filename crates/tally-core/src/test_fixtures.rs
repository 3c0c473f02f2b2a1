use crate::value::Document;

///
/// FixtureEvent
///

pub struct FixtureEvent {
    pub session: &'static str,
    pub user: &'static str,
    pub kind: &'static str,
    pub value: i64,
    pub timestamp: &'static str,
}

impl FixtureEvent {
    pub fn document(&self) -> Document {
        Document::new()
            .with("SessionId", self.session)
            .with("UserId", self.user)
            .with("Type", self.kind)
            .with("Value", self.value)
            .with("Timestamp", self.timestamp)
    }
}

/// Twelve events over three sessions of sizes 3, 4 and 5.
///
/// Types: 7 Click, 5 View. Users: u1..u4. Values sum to 78.
pub const EVENTS: [FixtureEvent; 12] = [
    event("s1", "u1", "Click", 1, "2024-01-01T10:00:00Z"),
    event("s1", "u1", "View", 2, "2024-01-01T10:05:00Z"),
    event("s1", "u1", "Click", 3, "2024-01-01T10:10:00Z"),
    event("s2", "u2", "View", 4, "2024-01-02T09:00:00Z"),
    event("s2", "u2", "Click", 5, "2024-01-02T09:01:00Z"),
    event("s2", "u2", "View", 6, "2024-01-02T09:02:00Z"),
    event("s2", "u2", "Click", 7, "2024-01-02T09:03:00Z"),
    event("s3", "u3", "Click", 8, "2024-01-03T23:59:59Z"),
    event("s3", "u3", "View", 9, "2024-01-03T00:00:00+02:00"),
    event("s3", "u4", "Click", 10, "2024-01-04"),
    event("s3", "u4", "View", 11, "2024-01-04T08:00:00"),
    event("s3", "u4", "Click", 12, "2024-01-04T12:00:00Z"),
];

const fn event(
    session: &'static str,
    user: &'static str,
    kind: &'static str,
    value: i64,
    timestamp: &'static str,
) -> FixtureEvent {
    FixtureEvent {
        session,
        user,
        kind,
        value,
        timestamp,
    }
}

/// The fixture as documents, in order.
pub fn events() -> Vec<Document> {
    EVENTS.iter().map(FixtureEvent::document).collect()
}

/// One synthetic event per (user, event) pair: `users` distinct users with
/// `per_user` events each.
pub fn user_events(prefix: &str, users: usize, per_user: usize) -> Vec<Document> {
    (0..users)
        .flat_map(|user| {
            (0..per_user).map(move |n| {
                Document::new()
                    .with("UserId", format!("{prefix}{user}"))
                    .with("Type", if n % 2 == 0 { "Click" } else { "View" })
                    .with("Value", i64::try_from(n).unwrap_or_default())
            })
        })
        .collect()
}
