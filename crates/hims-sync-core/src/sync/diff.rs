//! Three-way field diff

use std::collections::BTreeSet;

use crate::models::Payload;
use crate::util::json_opt_eq;

/// Keys never compared between client and server
pub const IGNORED_FIELDS: [&str; 5] = ["id", "created_at", "updated_at", "deleted_at", "version"];

/// Fields both sides changed away from the base, to different values.
///
/// Iterates the union of client and server keys. A key absent from the base
/// (or no base at all) has no base value, so any present value counts as a
/// change. Values compare structurally. The result is sorted by name.
pub fn conflicting_fields(
    base: Option<&Payload>,
    client: &Payload,
    server: &Payload,
) -> Vec<String> {
    let keys: BTreeSet<&String> = client.keys().chain(server.keys()).collect();

    keys.into_iter()
        .filter(|key| !IGNORED_FIELDS.contains(&key.as_str()))
        .filter(|key| {
            let base_value = base.and_then(|base| base.get(*key));
            let client_value = client.get(*key);
            let server_value = server.get(*key);

            !json_opt_eq(client_value, base_value)
                && !json_opt_eq(server_value, base_value)
                && !json_opt_eq(client_value, server_value)
        })
        .cloned()
        .collect()
}

/// Client payload keys that take part in a diff, for conflicts with no server row.
pub fn comparable_keys(payload: &Payload) -> Vec<String> {
    payload
        .keys()
        .filter(|key| !IGNORED_FIELDS.contains(&key.as_str()))
        .cloned()
        .collect()
}
