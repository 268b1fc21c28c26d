use redb::TableDefinition;

/// Activation snapshot rows keyed by workload name. Values are JSON
/// [`SnapshotRow`](crate::store::SnapshotRow)s.
pub const ACTIVATIONS: TableDefinition<&str, &[u8]> = TableDefinition::new("activations");
