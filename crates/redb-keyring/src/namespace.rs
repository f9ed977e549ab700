/// Rewrites a logical namespace so two supervisor instances on one host
/// never share a secret: `<service_name_prefix>-<group_id>-<namespace>`.
pub fn rewrite(service_name_prefix: &str, group_id: &str, namespace: &str) -> String {
    format!("{service_name_prefix}-{group_id}-{namespace}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rewrite_concatenates_prefix_group_and_namespace() {
        assert_eq!(rewrite("redb", "default", "database"), "redb-default-database");
    }

    #[test]
    fn different_group_ids_never_collide() {
        let a = rewrite("redb", "node-a", "database");
        let b = rewrite("redb", "node-b", "database");
        assert_ne!(a, b);
    }
}
