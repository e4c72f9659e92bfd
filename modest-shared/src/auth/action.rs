/// Action strings
///
/// An action is the lookup key for authorization: the HTTP method and the
/// request path, lower-cased and joined with `:`.
///
/// | Request                       | Action                      |
/// |-------------------------------|-----------------------------|
/// | `GET /api/tasks/`             | `get:api:tasks`             |
/// | `DELETE /api/tasks/42`        | `delete:api:tasks:42`       |
/// | `PUT /api/tasks/42/status`    | `put:api:tasks:42:status`   |
///
/// Rules are registered against templates such as `delete:api:tasks:*`. A
/// request matches a template once the target resource is put in its `*`
/// positions (see [`substitute_target`]).

/// Wildcard segment and the target used for collection routes
pub const ANY_TARGET: &str = "*";

/// Builds the action string for a request
///
/// Pure and total: any input is accepted. An empty or root path yields the
/// bare lower-cased method, and the result never starts or ends with `:`.
///
/// # Example
///
/// ```
/// use modest_shared::auth::action::build_action;
///
/// assert_eq!(build_action("GET", "/api/tasks/"), "get:api:tasks");
/// assert_eq!(build_action("DELETE", "/api/tasks/42"), "delete:api:tasks:42");
/// assert_eq!(build_action("POST", ""), "post");
/// ```
pub fn build_action(method: &str, path: &str) -> String {
    let method = method.to_lowercase();
    let path = path.to_lowercase().replace('/', ":");

    let mut action = format!("{}:{}", method, path.trim_start_matches(':'));
    let trimmed_len = action.trim_end_matches(':').len();
    action.truncate(trimmed_len);

    if action.starts_with(':') {
        action.trim_start_matches(':').to_string()
    } else {
        action
    }
}

/// Replaces `target` with `*` at the positions `template` marks as parameters
///
/// Only segments where `template` has `*` are considered, so a target that
/// happens to equal a literal segment (`tasks`, `status`) leaves that segment
/// alone. Matching ignores case because actions are lower-cased while
/// resource ids may not be. A target of `*` leaves the action unchanged.
///
/// # Example
///
/// ```
/// use modest_shared::auth::action::substitute_target;
///
/// assert_eq!(
///     substitute_target("delete:api:tasks:42", "42", "delete:api:tasks:*"),
///     "delete:api:tasks:*"
/// );
/// assert_eq!(
///     substitute_target("delete:api:tasks:tasks", "tasks", "delete:api:tasks:*"),
///     "delete:api:tasks:*"
/// );
/// assert_eq!(substitute_target("get:api:tasks", "*", "get:api:tasks"), "get:api:tasks");
/// ```
pub fn substitute_target(action: &str, target: &str, template: &str) -> String {
    if target == ANY_TARGET || target.is_empty() {
        return action.to_string();
    }

    let target = target.to_lowercase();
    let mut params = template.split(':').map(|segment| segment == ANY_TARGET);
    action
        .split(':')
        .map(|segment| {
            let is_param = params.next().unwrap_or(false);
            if is_param && segment == target {
                ANY_TARGET
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

/// Builds the action template for a route pattern
///
/// Parameter segments such as `{id}` become `*`, the positions
/// [`substitute_target`] fills for a concrete request.
///
/// # Example
///
/// ```
/// use modest_shared::auth::action::action_template;
///
/// assert_eq!(action_template("PUT", "/api/tasks/{id}/status"), "put:api:tasks:*:status");
/// ```
pub fn action_template(method: &str, pattern: &str) -> String {
    build_action(method, pattern)
        .split(':')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                ANY_TARGET
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join(":")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_action_examples() {
        assert_eq!(build_action("GET", "/api/tasks/"), "get:api:tasks");
        assert_eq!(build_action("GET", "/api/tasks"), "get:api:tasks");
        assert_eq!(build_action("POST", "/api/tasks"), "post:api:tasks");
        assert_eq!(build_action("DELETE", "/api/tasks/42"), "delete:api:tasks:42");
        assert_eq!(
            build_action("put", "/API/Tasks/42/Status"),
            "put:api:tasks:42:status"
        );
    }

    #[test]
    fn test_build_action_degenerate_paths() {
        assert_eq!(build_action("GET", ""), "get");
        assert_eq!(build_action("GET", "/"), "get");
        assert_eq!(build_action("GET", "//"), "get");
        assert_eq!(build_action("GET", "api/tasks"), "get:api:tasks");
        assert_eq!(build_action("", "/api"), "api");
        assert_eq!(build_action("", ""), "");
    }

    #[test]
    fn test_build_action_never_leading_or_trailing_colon() {
        let methods = ["GET", "post", "", "Delete"];
        let paths = ["", "/", "/a", "/a/", "a/b//", "//x//y//", ":", "/::/"];

        for method in methods {
            for path in paths {
                let action = build_action(method, path);
                assert!(!action.starts_with(':'), "{:?} {:?} -> {}", method, path, action);
                assert!(!action.ends_with(':'), "{:?} {:?} -> {}", method, path, action);
            }
        }
    }

    #[test]
    fn test_build_action_is_idempotent() {
        let first = build_action("PUT", "/api/tasks/X1/text/");
        for _ in 0..10 {
            assert_eq!(build_action("PUT", "/api/tasks/X1/text/"), first);
        }
    }

    #[test]
    fn test_substitute_target() {
        assert_eq!(
            substitute_target("delete:api:tasks:42", "42", "delete:api:tasks:*"),
            "delete:api:tasks:*"
        );
        assert_eq!(
            substitute_target("put:api:tasks:abc:text", "aBc", "put:api:tasks:*:text"),
            "put:api:tasks:*:text"
        );
        assert_eq!(substitute_target("get:api:tasks", "*", "get:api:tasks"), "get:api:tasks");
        assert_eq!(substitute_target("get:api:tasks", "", "get:api:tasks"), "get:api:tasks");
        assert_eq!(
            substitute_target("get:api:tasks", "nope", "get:api:tasks"),
            "get:api:tasks"
        );
    }

    #[test]
    fn test_substitute_target_only_at_parameter_positions() {
        assert_eq!(
            substitute_target("delete:api:tasks:tasks", "tasks", "delete:api:tasks:*"),
            "delete:api:tasks:*"
        );
        assert_eq!(
            substitute_target("put:api:tasks:status:status", "status", "put:api:tasks:*:status"),
            "put:api:tasks:*:status"
        );
        assert_eq!(substitute_target("get:get", "get", "get:*"), "get:*");

        // Longer than the template: extra segments are left as they are
        assert_eq!(
            substitute_target("delete:api:tasks:42:42", "42", "delete:api:tasks:*"),
            "delete:api:tasks:*:42"
        );
    }

    #[test]
    fn test_action_template() {
        assert_eq!(action_template("GET", "/api/tasks"), "get:api:tasks");
        assert_eq!(action_template("DELETE", "/api/tasks/{id}"), "delete:api:tasks:*");
        assert_eq!(
            action_template("PUT", "/api/tasks/{id}/text"),
            "put:api:tasks:*:text"
        );
    }

    #[test]
    fn test_template_matches_substituted_request() {
        let id = "Zq81";
        let template = action_template("PUT", "/api/tasks/{id}/status");
        let request = substitute_target(
            &build_action("PUT", &format!("/api/tasks/{}/status", id)),
            id,
            &template,
        );
        assert_eq!(request, template);
    }
}
