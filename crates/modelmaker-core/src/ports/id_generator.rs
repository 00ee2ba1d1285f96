//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: ULID ベース（本番用）

use crate::domain::ids::{FileId, MessageId, TaskId};
use crate::ports::Clock;
use ulid::Ulid;

/// IdGenerator は分散環境でも衝突しない ID を生成
///
/// # Thread Safety
/// - `Send + Sync` を要求（ワーカーとリクエスト処理の両方から使う）
pub trait IdGenerator: Send + Sync {
    fn task_id(&self) -> TaskId;

    fn file_id(&self) -> FileId;

    fn message_id(&self) -> MessageId;
}

/// UlidGenerator は Clock の現在時刻から ULID を作る
///
/// FixedClock を渡せば timestamp 部分が決定的になる。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        TaskId::from(self.next())
    }

    fn file_id(&self) -> FileId {
        FileId::from(self.next())
    }

    fn message_id(&self) -> MessageId {
        MessageId::from(self.next())
    }
}
