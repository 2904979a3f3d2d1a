//! Retention policy and deletion selection
//!
//! Images of one repository are split by build-lifecycle class. Within each
//! of `meta`, `release` and `prepare`, images younger than the keep window are
//! untouchable and, among the older ones, the `keep_count` most recent
//! survive. Config images are always selected. A repository holding no more
//! than `keep_count` images in total is never pruned.

use crate::error::handlers::ValidationErrorHandler;
use crate::error::{RegistryError, Result};
use crate::image::{Image, ImageClass};
use std::time::Duration;

pub const DEFAULT_KEEP_COUNT: usize = 20;
pub const DEFAULT_KEEP_DURATION_SECS: u64 = 30 * 24 * 60 * 60;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetentionPolicy {
    keep_count: usize,
    keep_duration: Duration,
}

impl RetentionPolicy {
    pub fn new(keep_count: usize, keep_duration: Duration) -> Result<Self> {
        if keep_count < 1 {
            return Err(RegistryError::Validation(
                "Keep count must be bigger than 0".to_string(),
            ));
        }
        if keep_duration.as_secs() < 1 {
            return Err(RegistryError::Validation(
                "Keep duration must be at least one second".to_string(),
            ));
        }
        Ok(Self {
            keep_count,
            keep_duration,
        })
    }

    /// Build from the raw `--num` / `--time` operator values
    pub fn from_args(num: i64, time_secs: i64) -> Result<Self> {
        let keep_count = ValidationErrorHandler::validate_positive("num", num)?;
        let keep_secs = ValidationErrorHandler::validate_positive("time", time_secs)?;
        let keep_count = usize::try_from(keep_count)
            .map_err(|_| RegistryError::Validation(format!("num is too large: {}", num)))?;
        Self::new(keep_count, Duration::from_secs(keep_secs))
    }

    pub fn keep_count(&self) -> usize {
        self.keep_count
    }

    pub fn keep_duration(&self) -> Duration {
        self.keep_duration
    }

    fn keep_secs(&self) -> i64 {
        i64::try_from(self.keep_duration.as_secs()).unwrap_or(i64::MAX)
    }
}

impl Default for RetentionPolicy {
    fn default() -> Self {
        Self {
            keep_count: DEFAULT_KEEP_COUNT,
            keep_duration: Duration::from_secs(DEFAULT_KEEP_DURATION_SECS),
        }
    }
}

/// Where each image of a repository ended up
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetentionPlan {
    /// Config images first, then meta, release and prepare overflow
    pub to_delete: Vec<Image>,
    /// Old images within the per-class keep count
    pub retained: Vec<Image>,
    /// Images inside the keep window
    pub too_young: Vec<Image>,
    /// Unknown-class images, never touched
    pub unclassified: Vec<Image>,
    /// Images without a digest, never deletable
    pub unresolved: Vec<Image>,
}

impl RetentionPlan {
    fn keep_all(images: &[Image]) -> Self {
        Self {
            retained: images.to_vec(),
            ..Default::default()
        }
    }
}

/// Partition `images` by retention outcome at `now` (unix seconds)
pub fn plan(images: &[Image], policy: &RetentionPolicy, now: i64) -> RetentionPlan {
    if images.len() <= policy.keep_count() {
        return RetentionPlan::keep_all(images);
    }

    let mut result = RetentionPlan::default();
    let mut buckets: [Vec<(i64, &Image)>; 3] = Default::default();

    for image in images {
        if !image.has_digest() {
            result.unresolved.push(image.clone());
            continue;
        }

        let classification = image.classification();
        let slot = ImageClass::RETAINED
            .iter()
            .position(|class| *class == classification.class);

        match (classification.class, slot, classification.timestamp) {
            (ImageClass::Config, _, _) => result.to_delete.push(image.clone()),
            (_, Some(slot), Some(timestamp)) => {
                if now.saturating_sub(timestamp) <= policy.keep_secs() {
                    result.too_young.push(image.clone());
                } else {
                    buckets[slot].push((timestamp, image));
                }
            }
            _ => result.unclassified.push(image.clone()),
        }
    }

    for mut bucket in buckets {
        // stable: equal timestamps keep enumeration order
        bucket.sort_by(|a, b| b.0.cmp(&a.0));
        for (position, (_, image)) in bucket.into_iter().enumerate() {
            if position < policy.keep_count() {
                result.retained.push(image.clone());
            } else {
                result.to_delete.push(image.clone());
            }
        }
    }

    result
}

/// Images to delete from one repository under `policy` at `now`
pub fn select_for_deletion(images: &[Image], policy: &RetentionPolicy, now: i64) -> Vec<Image> {
    plan(images, policy, now).to_delete
}

/// Current unix time in seconds
pub fn now_unix() -> i64 {
    chrono::Utc::now().timestamp()
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const NOW: i64 = 1_700_000_000;
    const DAY: i64 = 86_400;

    fn image(tag: String) -> Image {
        let digest = format!("sha256:{:0>64}", tag.len());
        Image::new("app/web", tag, digest)
    }

    fn policy(count: usize, secs: u64) -> RetentionPolicy {
        RetentionPolicy::new(count, Duration::from_secs(secs)).unwrap()
    }

    #[test]
    fn test_policy_validation() {
        assert!(RetentionPolicy::new(0, Duration::from_secs(10)).is_err());
        assert!(RetentionPolicy::new(1, Duration::ZERO).is_err());
        assert!(RetentionPolicy::from_args(0, 10).is_err());
        assert!(RetentionPolicy::from_args(5, -1).is_err());

        let p = RetentionPolicy::from_args(5, 60).unwrap();
        assert_eq!(p.keep_count(), 5);
        assert_eq!(p.keep_duration(), Duration::from_secs(60));

        let d = RetentionPolicy::default();
        assert_eq!(d.keep_count(), 20);
        assert_eq!(d.keep_duration(), Duration::from_secs(2_592_000));
    }

    #[test]
    fn test_overflow_deletes_oldest_five() {
        let images: Vec<Image> = (0..25)
            .map(|i| image(format!("release-{}-x", NOW - 100 * DAY + i)))
            .collect();

        let deleted = select_for_deletion(&images, &policy(20, 30 * DAY as u64), NOW);
        let tags: Vec<&str> = deleted.iter().map(|i| i.tag.as_str()).collect();

        assert_eq!(deleted.len(), 5);
        // newest first after sorting, so the overflow runs from the 5th oldest down
        let expected: Vec<String> = (0..5)
            .rev()
            .map(|i| format!("release-{}-x", NOW - 100 * DAY + i))
            .collect();
        assert_eq!(tags, expected);
    }

    #[test]
    fn test_small_repository_is_never_pruned() {
        let images = vec![
            image(format!("release-{}-a", NOW - 900 * DAY)),
            image(format!("meta-{}-a", NOW - 900 * DAY)),
            image("app-config-1".to_string()),
        ];
        let plan = plan(&images, &policy(20, 1), NOW);
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.retained.len(), 3);
    }

    #[test]
    fn test_young_images_survive_any_count() {
        let images: Vec<Image> = (0..10)
            .map(|i| image(format!("meta-{}-x", NOW - i)))
            .collect();
        let plan = plan(&images, &policy(1, 3600), NOW);
        assert!(plan.to_delete.is_empty());
        assert_eq!(plan.too_young.len(), 10);
    }

    #[test]
    fn test_boundary_age_is_young() {
        let images = vec![
            image(format!("release-{}-a", NOW - 100)),
            image(format!("release-{}-b", NOW - 101)),
            image(format!("release-{}-c", NOW - 102)),
        ];
        let deleted = select_for_deletion(&images, &policy(1, 100), NOW);
        // exactly keep_duration old is still protected; b is kept, c deleted
        assert_eq!(deleted, vec![images[2].clone()]);
    }

    #[test]
    fn test_classes_are_independent() {
        let mut images = Vec::new();
        for i in 0..4 {
            images.push(image(format!("meta-{}-m", NOW - 50 * DAY - i)));
            images.push(image(format!("release-{}-r", NOW - 50 * DAY - i)));
            images.push(image(format!("prepare-9-{}-p", NOW - 50 * DAY - i)));
        }
        let plan = plan(&images, &policy(3, DAY as u64), NOW);

        let classes: Vec<ImageClass> = plan.to_delete.iter().map(|i| i.classification().class).collect();
        assert_eq!(classes, vec![ImageClass::Meta, ImageClass::Release, ImageClass::Prepare]);
        assert_eq!(plan.retained.len(), 9);
    }

    #[test]
    fn test_config_images_go_first_regardless_of_age() {
        let mut images: Vec<Image> = (0..3)
            .map(|i| image(format!("release-{}-x", NOW - 40 * DAY - i)))
            .collect();
        images.push(image("app-config-new".to_string()));
        images.push(image("web-config-old".to_string()));

        let deleted = select_for_deletion(&images, &policy(2, DAY as u64), NOW);
        let tags: Vec<&str> = deleted.iter().map(|i| i.tag.as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "app-config-new".to_string(),
                "web-config-old".to_string(),
                format!("release-{}-x", NOW - 40 * DAY - 2)
            ]
        );
    }

    #[test]
    fn test_unknown_and_unresolved_are_untouched() {
        let mut images: Vec<Image> = vec![
            image("latest".to_string()),
            image("release-notatime-x".to_string()),
            Image::new("app/web", format!("release-{}-nodigest", NOW - 99 * DAY), ""),
        ];
        images.extend((0..3).map(|i| image(format!("release-{}-x", NOW - 60 * DAY - i))));

        let plan = plan(&images, &policy(1, DAY as u64), NOW);
        assert_eq!(plan.unclassified.len(), 2);
        assert_eq!(plan.unresolved.len(), 1);
        assert_eq!(plan.to_delete.len(), 2);
        assert!(plan.to_delete.iter().all(|i| i.has_digest()));
    }

    #[test]
    fn test_equal_timestamps_keep_enumeration_order() {
        let ts = NOW - 10 * DAY;
        let images: Vec<Image> = ["a", "b", "c", "d"]
            .iter()
            .map(|s| image(format!("meta-{}-{}", ts, s)))
            .collect();
        let plan = plan(&images, &policy(2, DAY as u64), NOW);
        assert_eq!(plan.retained, images[..2].to_vec());
        assert_eq!(plan.to_delete, images[2..].to_vec());
    }

    fn arb_tag() -> impl Strategy<Value = String> {
        prop_oneof![
            (prop::sample::select(vec!["meta", "release"]), 0i64..NOW + DAY, "[a-z]{1,4}")
                .prop_map(|(c, ts, s)| format!("{}-{}-{}", c, ts, s)),
            (0i64..NOW + DAY, "[a-z]{1,4}").prop_map(|(ts, s)| format!("prepare-1-{}-{}", ts, s)),
            "[a-z]{1,4}".prop_map(|s| format!("app-config-{}", s)),
            "[a-z0-9]{1,8}",
        ]
    }

    proptest! {
        #[test]
        fn retention_invariants_hold(
            tags in prop::collection::vec(arb_tag(), 0..60),
            keep_count in 1usize..15,
            keep_secs in 1u64..(400 * DAY as u64),
        ) {
            let images: Vec<Image> = tags.into_iter().map(image).collect();
            let policy = policy(keep_count, keep_secs);
            let plan = plan(&images, &policy, NOW);

            // idempotent
            prop_assert_eq!(select_for_deletion(&images, &policy, NOW), plan.to_delete.clone());

            if images.len() <= keep_count {
                prop_assert!(plan.to_delete.is_empty());
            }

            for deleted in &plan.to_delete {
                let c = deleted.classification();
                prop_assert!(c.class != ImageClass::Unknown);
                if let Some(ts) = c.timestamp {
                    prop_assert!(NOW - ts > keep_secs as i64);
                }
            }

            for class in ImageClass::RETAINED {
                let retained_old = plan
                    .retained
                    .iter()
                    .filter(|i| i.classification().class == class)
                    .count();
                prop_assert!(images.len() <= keep_count || retained_old <= keep_count);
            }
        }
    }
}
