/// Position of an event within its aggregate's log.
///
/// The first committed event of an aggregate carries sequence number `1`;
/// subsequent events increase it by exactly one, with no gaps and no
/// duplicates. `0` is reserved for "no events yet" and is the expected
/// version of an init append.
pub type SequenceNumber = u64;
