// Copyright (c) 2026 shaneyale (shaneyale86@gmail.com)
// All rights reserved.

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::SystemTime;

use lru::LruCache;

#[derive(Clone)]
struct CacheEntry {
    source: Arc<str>,
    modified_time: SystemTime,
}

/// 模板源码的进程级 LRU 缓存，以模板文件路径为键，修改时间不一致即视为失效
pub struct TemplateCache {
    cache: LruCache<PathBuf, CacheEntry>,
}

impl TemplateCache {
    // 根据容量构造，容量为0时按1处理
    pub fn from_capacity(capacity: usize) -> Self {
        Self {
            cache: LruCache::new(NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN)),
        }
    }

    // 放入
    pub fn push(&mut self, path: &Path, source: Arc<str>, modified_time: SystemTime) {
        let entry = CacheEntry {
            source,
            modified_time,
        };
        self.cache.put(path.to_path_buf(), entry);
    }

    // 查询有效缓存
    pub fn find(&mut self, path: &Path, current_modified_time: SystemTime) -> Option<Arc<str>> {
        match self.cache.get(path) {
            Some(entry) if entry.modified_time == current_modified_time => {
                Some(Arc::clone(&entry.source))
            }
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.cache.cap().get()
    }
}
