//! 配置校验模块
//!
//! 校验规则：
//! - identity handle 唯一且非空
//! - destination link 规范化后唯一且非空
//! - batch_size >= 1
//! - tick_secs / recent_capacity / max_concurrent_events > 0
//! - refresh 帖子链接可解析，刷新周期 > 0

use std::collections::HashSet;

use contracts::{normalize_link, ContentRef, ContractError, RelayBlueprint};

/// 校验 RelayBlueprint 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    validate_identities(blueprint)?;
    validate_destinations(blueprint)?;
    validate_sources(blueprint)?;
    validate_modes(blueprint)?;
    validate_refresh(blueprint)?;
    Ok(())
}

/// 校验 identity handle 唯一性 (去除首尾空白后比较，与凭据存储一致)
fn validate_identities(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, identity) in blueprint.identities.iter().enumerate() {
        let handle = identity.handle.trim();
        if handle.is_empty() {
            return Err(ContractError::config_validation(
                format!("identities[{idx}].handle"),
                "identity handle cannot be empty",
            ));
        }
        if !seen.insert(handle) {
            return Err(ContractError::config_validation(
                format!("identities[handle={handle}]"),
                "duplicate identity handle",
            ));
        }
    }
    Ok(())
}

/// 校验目标：规范化后唯一，batch_size >= 1
fn validate_destinations(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, dest) in blueprint.destinations.iter().enumerate() {
        let link = normalize_link(&dest.link);
        if link.is_empty() {
            return Err(ContractError::config_validation(
                format!("destinations[{idx}].link"),
                "destination link cannot be empty",
            ));
        }
        if dest.batch_size == 0 {
            return Err(ContractError::config_validation(
                format!("destinations[{link}].batch_size"),
                "batch_size must be >= 1",
            ));
        }
        if !seen.insert(link.clone()) {
            return Err(ContractError::config_validation(
                format!("destinations[link={link}]"),
                "duplicate destination link",
            ));
        }
    }
    Ok(())
}

fn validate_sources(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let mut seen = HashSet::new();
    for (idx, source) in blueprint.sources.iter().enumerate() {
        if source.feed.is_empty() {
            return Err(ContractError::config_validation(
                format!("sources[{idx}].feed"),
                "source feed cannot be empty",
            ));
        }
        if !seen.insert(source.feed.as_str()) {
            return Err(ContractError::config_validation(
                format!("sources[feed={}]", source.feed),
                "duplicate source feed",
            ));
        }
    }
    Ok(())
}

/// 校验调度模式参数
fn validate_modes(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    if blueprint.batch.tick_secs == 0 {
        return Err(ContractError::config_validation(
            "batch.tick_secs",
            "tick_secs must be > 0",
        ));
    }
    if blueprint.batch.fetch_limit == 0 {
        return Err(ContractError::config_validation(
            "batch.fetch_limit",
            "fetch_limit must be > 0",
        ));
    }
    if blueprint.relay.recent_capacity == 0 {
        return Err(ContractError::config_validation(
            "relay.recent_capacity",
            "recent_capacity must be > 0",
        ));
    }
    if blueprint.relay.max_concurrent_events == 0 {
        return Err(ContractError::config_validation(
            "relay.max_concurrent_events",
            "max_concurrent_events must be > 0",
        ));
    }
    Ok(())
}

/// 校验单帖刷新配置
fn validate_refresh(blueprint: &RelayBlueprint) -> Result<(), ContractError> {
    let Some(refresh) = &blueprint.refresh else {
        return Ok(());
    };

    if ContentRef::from_post_link(&refresh.post).is_none() {
        return Err(ContractError::config_validation(
            "refresh.post",
            format!(
                "expected a post link like https://t.me/<channel>/<id>, got '{}'",
                refresh.post
            ),
        ));
    }
    if refresh.interval_minutes == 0 {
        return Err(ContractError::config_validation(
            "refresh.interval_minutes",
            "interval_minutes must be > 0",
        ));
    }
    Ok(())
}
