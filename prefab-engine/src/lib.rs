pub mod boundary;
pub mod classify;
pub mod codes;
pub mod command;
pub mod demo;
pub mod fittings;
pub mod grid;
pub mod model;
pub mod region;
pub mod session;
pub mod tags;
pub mod workflow;

pub mod errors {
    use thiserror::Error;

    #[derive(Debug, Clone, PartialEq, Error)]
    pub enum EngineError {
        #[error("selection was cancelled")]
        SelectionCancelled,
        #[error("boundary is not closed ({chained} of {total} segments chained)")]
        OpenBoundary { chained: usize, total: usize },
        #[error("no relevant entities inside the boundary")]
        EmptyRegion,
        #[error("could not parse a base code from {0:?}")]
        UnparsableBase(String),
        #[error("label text is empty")]
        EmptyLabel,
        #[error("code {code} is already used by entity {entity}")]
        DuplicateIdentifier { code: String, entity: u64 },
        #[error("entity with id {0} not found")]
        EntityNotFound(u64),
        #[error("entity with id {0} is read-only")]
        EntityReadOnly(u64),
        #[error("entity with id {0} cannot be tagged")]
        NotTaggable(u64),
        #[error("transaction `{description}` failed: {source}")]
        TransactionFailure {
            description: String,
            #[source]
            source: Box<EngineError>,
        },
    }

    impl EngineError {
        /// 需要用户修改输入后重试的错误：提交被阻止，但工作流继续。
        pub fn is_user_correctable(&self) -> bool {
            matches!(
                self,
                EngineError::UnparsableBase(_)
                    | EngineError::EmptyLabel
                    | EngineError::DuplicateIdentifier { .. }
            )
        }

        /// 剥离事务包装，返回最初的失败原因。
        pub fn root_cause(&self) -> &EngineError {
            match self {
                EngineError::TransactionFailure { source, .. } => source.root_cause(),
                other => other,
            }
        }
    }
}
