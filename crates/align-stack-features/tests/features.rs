use align_stack_core::synthetic::{rotate_about_center, textured_scene, translate, SCENE_BACKGROUND};
use align_stack_features::{
    DescriptorMatcher, DetectorParams, FeatureDetector, MatchStrategy, MatcherParams,
};

#[test]
fn keypoint_count_never_drops_as_sensitivity_rises() {
    let detector = FeatureDetector::new(DetectorParams {
        max_features: 100_000,
        ..DetectorParams::default()
    });
    for img in [
        textured_scene(200, 160, 11),
        rotate_about_center(&textured_scene(200, 160, 12), 0.3, SCENE_BACKGROUND),
    ] {
        let mut prev = 0usize;
        for step in 0..=20 {
            let s = step as f32 / 20.0;
            let n = detector.detect(&img.view(), s).map(|f| f.len()).unwrap_or(0);
            assert!(n >= prev, "count fell from {prev} to {n} at sensitivity {s}");
            prev = n;
        }
        assert!(prev > 0);
    }
}

#[test]
fn capped_counts_stay_monotone() {
    let detector = FeatureDetector::new(DetectorParams {
        max_features: 60,
        ..DetectorParams::default()
    });
    let img = textured_scene(200, 160, 13);
    let counts: Vec<usize> = [0.0, 0.25, 0.5, 0.75, 1.0]
        .iter()
        .map(|&s| detector.detect(&img.view(), s).map(|f| f.len()).unwrap_or(0))
        .collect();
    assert!(counts.windows(2).all(|w| w[0] <= w[1]), "{counts:?}");
    assert_eq!(*counts.last().unwrap(), 60);
}

#[test]
fn detection_is_deterministic() {
    let img = textured_scene(256, 192, 21);
    let detector = FeatureDetector::default();
    let a = detector.detect(&img.view(), 0.6).unwrap();
    let b = detector.detect(&img.view(), 0.6).unwrap();
    assert_eq!(a, b);
}

#[test]
fn identical_frames_match_onto_themselves() {
    let img = textured_scene(256, 192, 22);
    let f = FeatureDetector::default().detect(&img.view(), 0.5).unwrap();
    let matches = DescriptorMatcher::default().match_descriptors(
        &f.descriptors,
        &f.descriptors,
        MatchStrategy::BruteForce,
    );
    assert!(matches.len() >= 50, "only {} matches", matches.len());
    for m in &matches {
        assert_eq!(m.distance, 0);
        assert_eq!(m.reference_idx, m.candidate_idx);
    }
}

#[test]
fn shifted_frame_matches_follow_the_shift() {
    let reference = textured_scene(256, 192, 23);
    let shifted = translate(&reference, 7.0, -4.0, SCENE_BACKGROUND);
    let detector = FeatureDetector::default();
    let fr = detector.detect(&reference.view(), 0.5).unwrap();
    let fc = detector.detect(&shifted.view(), 0.5).unwrap();

    for strategy in [MatchStrategy::BruteForce, MatchStrategy::Approximate] {
        let matches = DescriptorMatcher::new(MatcherParams::default()).match_descriptors(
            &fr.descriptors,
            &fc.descriptors,
            strategy,
        );
        assert!(matches.len() >= 20, "{strategy}: {} matches", matches.len());
        let consistent = matches
            .iter()
            .filter(|m| {
                let r = fr.keypoints[m.reference_idx];
                let c = fc.keypoints[m.candidate_idx];
                (c.x - r.x - 7.0).abs() < 0.5 && (c.y - r.y + 4.0).abs() < 0.5
            })
            .count();
        assert!(
            consistent * 10 >= matches.len() * 8,
            "{strategy}: {consistent} of {} consistent",
            matches.len()
        );
    }
}
