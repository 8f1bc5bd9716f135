pub mod cursor;
pub mod recognize;
pub mod scanner;
pub mod statement;

pub use cursor::StatementParser;
pub use statement::{
    CommandTag, GrantTarget, IsolationLevel, PragmaValue, Privilege, ShowIndexesOpts, ShowKind, Statement,
    StatementDetail, TransactionMode, TxBehavior,
};

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn parses_a_batch_of_mixed_statements() {
        let mut parser = StatementParser::new(
            "begin; insert into t values (1); select * from t for update; commit;",
        );
        let tags: Vec<_> = std::iter::from_fn(|| parser.next().transpose())
            .map(|r| r.unwrap().tag)
            .collect();
        assert_eq!(
            tags,
            vec![CommandTag::Begin, CommandTag::Insert, CommandTag::Select, CommandTag::Commit]
        );
    }
}
