//! Shadow receiver bounds

use umbra_scene::{Aabb, Camera, SceneManager};

/// Merge the receiver boxes of render queues `[min_rq, max_rq)` as seen by
/// `camera`.
///
/// Queues a previous scene pass already rendered for this camera have their
/// boxes; every maximal run of queues that were not rendered is culled for
/// receivers first, one cull per run. The range is clamped to the scene's
/// render queue count.
pub fn merge_receivers_boxes(
    scene: &mut SceneManager,
    camera: &Camera,
    min_rq: usize,
    max_rq: usize,
) -> Aabb {
    let count = scene.render_queue_count();
    let min_rq = min_rq.min(count);
    let max_rq = max_rq.min(count);

    let mut i = min_rq;
    while i < max_rq {
        if camera.is_rendered_rq(i) {
            i += 1;
            continue;
        }
        let mut j = i + 1;
        while j < max_rq && !camera.is_rendered_rq(j) {
            j += 1;
        }
        scene.cull_receivers_box(camera, i, j);
        i = j;
    }

    let mut merged = Aabb::NULL;
    let boxes = scene.receivers_boxes_per_rq(camera.id());
    for rq_box in boxes.iter().take(max_rq).skip(min_rq) {
        merged.merge(rq_box);
    }
    merged
}
