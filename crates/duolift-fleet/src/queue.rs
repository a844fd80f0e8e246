//! 每部电梯一条的请求队列
//!
//! 插入保持 FIFO 顺序并抑制重复；到站时把与队首相同的请求一次性全部清除。

use std::collections::VecDeque;

use crate::floor::RequestCode;

/// 请求队列
#[derive(Debug, Clone, Default)]
pub struct RequestQueue {
    entries: VecDeque<RequestCode>,
}

impl RequestQueue {
    /// 创建空队列
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入一个请求码
    ///
    /// 已经在队的码被抑制；否则追加到队尾。返回是否真正插入。
    pub fn insert(&mut self, code: RequestCode) -> bool {
        if self.contains(code) {
            return false;
        }
        self.entries.push_back(code);
        true
    }

    /// 队列中是否已有该码
    pub fn contains(&self, code: RequestCode) -> bool {
        self.entries.contains(&code)
    }

    /// 队首请求
    pub fn head(&self) -> Option<RequestCode> {
        self.entries.front().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// 到站清除：移除与队首相同的**所有**请求，返回移除数量
    ///
    /// 电梯在途期间重复的外部按压可能再次入队同一个码，
    /// 因此只清队首一个是不够的。
    pub fn drain_satisfied(&mut self) -> usize {
        match self.head() {
            Some(code) => self.drain_code(code),
            None => 0,
        }
    }

    /// 移除指定码的所有出现，返回移除数量
    pub fn drain_code(&mut self, code: RequestCode) -> usize {
        let before = self.entries.len();
        self.entries.retain(|&c| c != code);
        before - self.entries.len()
    }

    /// 清空队列
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// 紧急接管：队列被替换为单独一个紧急码
    pub fn replace_with_emergency(&mut self) {
        self.entries.clear();
        self.entries.push_back(RequestCode::Emergency);
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = RequestCode> + '_ {
        self.entries.iter().copied()
    }
}

// 原样恢复快照用，不做去重
impl FromIterator<RequestCode> for RequestQueue {
    fn from_iter<I: IntoIterator<Item = RequestCode>>(iter: I) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use RequestCode::*;

    #[test]
    fn test_insert_preserves_fifo_order() {
        let mut queue = RequestQueue::new();
        queue.insert(Second);
        queue.insert(Ground);
        queue.insert(Third);

        let order: Vec<_> = queue.iter().collect();
        assert_eq!(order, vec![Second, Ground, Third]);
        assert_eq!(queue.head(), Some(Second));
    }

    #[test]
    fn test_duplicate_insert_suppressed() {
        let mut queue = RequestQueue::new();
        assert!(queue.insert(Second));
        assert!(!queue.insert(Second));

        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_satisfied_removes_every_occurrence_of_head() {
        // 在途重复按压会再次排队同一个码
        let mut queue: RequestQueue = [Second, Ground, Second, Third, Second].into_iter().collect();

        let removed = queue.drain_satisfied();

        assert_eq!(removed, 3);
        let remaining: Vec<_> = queue.iter().collect();
        assert_eq!(remaining, vec![Ground, Third]);
    }

    #[test]
    fn test_drain_satisfied_on_empty_queue() {
        let mut queue = RequestQueue::new();
        assert_eq!(queue.drain_satisfied(), 0);
    }

    #[test]
    fn test_replace_with_emergency() {
        let mut queue = RequestQueue::new();
        queue.insert(Ground);
        queue.insert(Third);

        queue.replace_with_emergency();

        let entries: Vec<_> = queue.iter().collect();
        assert_eq!(entries, vec![Emergency]);
    }

    #[test]
    fn test_drain_code_leaves_others() {
        let mut queue: RequestQueue = [Ground, Second, Ground].into_iter().collect();
        assert_eq!(queue.drain_code(Ground), 2);
        let remaining: Vec<_> = queue.iter().collect();
        assert_eq!(remaining, vec![Second]);
    }
}
