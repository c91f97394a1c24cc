//! 메시지 버퍼.
//!
//! 거래소 메시지 도착 속도(변동성 구간에서 초당 100건 이상)와 화면 갱신 속도를
//! 분리합니다. 같은 키에 대한 연속 메시지는 하나의 레코드로 얕게 병합되고
//! (last-write-wins), 플러시 주기마다 마지막 플러시 이후 바뀐 레코드만 내보냅니다.
//! 플러시 구간 안의 중간 값은 관찰되지 않습니다.

use std::collections::{HashMap, HashSet};

/// 부분 업데이트를 누적할 수 있는 레코드.
pub trait Coalesce: Clone {
    /// 한 메시지가 실어 나르는 부분 레코드 타입.
    type Update;

    /// 키에 대한 빈 레코드를 생성합니다.
    fn seed(key: &str) -> Self;

    /// 부분 레코드를 병합합니다. 업데이트에 없는 필드는 유지합니다.
    fn coalesce(&mut self, update: &Self::Update);
}

/// 키별 last-write-wins 누적 버퍼.
///
/// 레코드는 비운 뒤에도 유지되어 다음 부분 메시지의 병합 기반이 됩니다.
/// `drain_if_dirty`는 복제본을 반환하므로 호출자가 받은 맵은 이후
/// `apply`의 영향을 받지 않습니다.
#[derive(Debug, Clone)]
pub struct MessageBuffer<R: Coalesce> {
    records: HashMap<String, R>,
    dirty_keys: HashSet<String>,
    dirty_count: u64,
}

impl<R: Coalesce> Default for MessageBuffer<R> {
    fn default() -> Self {
        Self {
            records: HashMap::new(),
            dirty_keys: HashSet::new(),
            dirty_count: 0,
        }
    }
}

impl<R: Coalesce> MessageBuffer<R> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 기존 레코드(예: REST 스냅샷)로 초기화합니다. 초기 레코드는 dirty가 아닙니다.
    pub fn with_records(records: impl IntoIterator<Item = (String, R)>) -> Self {
        Self {
            records: records.into_iter().collect(),
            ..Self::default()
        }
    }

    /// 부분 레코드를 키의 레코드에 병합하고 dirty 카운터를 올립니다.
    pub fn apply(&mut self, key: &str, update: &R::Update) {
        match self.records.get_mut(key) {
            Some(record) => record.coalesce(update),
            None => {
                let mut record = R::seed(key);
                record.coalesce(update);
                self.records.insert(key.to_string(), record);
            }
        }

        if !self.dirty_keys.contains(key) {
            self.dirty_keys.insert(key.to_string());
        }
        self.dirty_count += 1;
    }

    /// dirty 상태면 바뀐 레코드의 복제본을 반환하고 카운터를 초기화합니다.
    ///
    /// 마지막 플러시 이후 메시지가 없었다면 `None`을 반환합니다.
    pub fn drain_if_dirty(&mut self) -> Option<HashMap<String, R>> {
        if self.dirty_count == 0 {
            return None;
        }

        let drained = self
            .dirty_keys
            .drain()
            .filter_map(|key| {
                let record = self.records.get(&key)?.clone();
                Some((key, record))
            })
            .collect();
        self.dirty_count = 0;

        Some(drained)
    }

    /// 마지막 플러시 이후 적용된 메시지 수.
    pub fn dirty_count(&self) -> u64 {
        self.dirty_count
    }

    /// 현재 레코드를 조회합니다.
    pub fn get(&self, key: &str) -> Option<&R> {
        self.records.get(key)
    }

    /// 보유한 레코드 수.
    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}
