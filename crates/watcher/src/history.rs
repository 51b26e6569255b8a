//! 이벤트 히스토리 -- 크기 제한 FIFO
//!
//! [`EventHistory`]는 최근 이벤트를 도착 순서대로 보관합니다.
//! 용량을 넘으면 가장 오래된 이벤트부터 제거합니다.
//! 새 구독자/소비자가 합류할 때 재생용 스냅샷을 제공합니다.

use std::collections::VecDeque;

use authwatch_core::event::AuthEvent;

/// 크기 제한 이벤트 히스토리
#[derive(Debug, Clone)]
pub struct EventHistory {
    events: VecDeque<AuthEvent>,
    capacity: usize,
    /// 용량 초과로 제거된 이벤트 수
    evicted: u64,
}

impl EventHistory {
    /// 새 히스토리를 생성합니다. 용량 0은 1로 취급합니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: VecDeque::with_capacity(capacity.min(10_000)),
            capacity,
            evicted: 0,
        }
    }

    /// 이벤트를 추가합니다. 용량을 넘으면 가장 오래된 이벤트를 제거합니다.
    pub fn push(&mut self, event: AuthEvent) {
        while self.events.len() >= self.capacity {
            self.events.pop_front();
            self.evicted += 1;
        }
        self.events.push_back(event);
    }

    /// 가장 최근 `limit`개 이벤트를 도착 순서대로 반환합니다.
    ///
    /// 히스토리가 더 짧으면 전체를, `limit`이 0이면 빈 목록을 반환합니다.
    pub fn last(&self, limit: usize) -> Vec<AuthEvent> {
        let skip = self.events.len().saturating_sub(limit);
        self.events.iter().skip(skip).cloned().collect()
    }

    /// 전체 이벤트를 도착 순서대로 반환합니다.
    pub fn snapshot(&self) -> Vec<AuthEvent> {
        self.events.iter().cloned().collect()
    }

    /// 도착 순서 이터레이터를 반환합니다.
    pub fn iter(&self) -> impl Iterator<Item = &AuthEvent> {
        self.events.iter()
    }

    /// 현재 보관 중인 이벤트 수
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// 비어 있는지 확인합니다.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// 최대 용량
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 용량 초과로 제거된 이벤트 수
    pub fn evicted(&self) -> u64 {
        self.evicted
    }
}

impl Extend<AuthEvent> for EventHistory {
    fn extend<I: IntoIterator<Item = AuthEvent>>(&mut self, iter: I) {
        for event in iter {
            self.push(event);
        }
    }
}
