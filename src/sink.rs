/// Destination for rendered capture records.
///
/// Implementations must swallow their own failures: a sink is called from
/// inside error handlers, where raising a new fault is not an option.
pub trait LogSink: Send + Sync {
    /// Append one rendered record block.
    ///
    /// **Returns**
    /// - `true` if the text was persisted.
    /// - `false` if every write path failed. The caller logs nothing
    ///   further and carries on.
    fn append(&self, text: &str) -> bool;
}
