use clap::ValueEnum;

/// A placed object's box in background pixel coordinates.
///
/// `(x1, y1)` is the top-left corner and `(x2, y2)` the exclusive
/// bottom-right corner. `bg_w`/`bg_h` are the dimensions of the background
/// the box was placed on, kept alongside so labels can be normalized later.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BoundingBox {
    pub label: String,
    pub x1: u32,
    pub y1: u32,
    pub x2: u32,
    pub y2: u32,
    pub bg_w: u32,
    pub bg_h: u32,
}

impl BoundingBox {
    /// Box for an object of size `width`x`height` whose top-left corner sits at
    /// `(x_start, y_start)`
    pub fn from_placement(
        label: impl Into<String>,
        x_start: u32,
        y_start: u32,
        width: u32,
        height: u32,
        bg_w: u32,
        bg_h: u32,
    ) -> Self {
        BoundingBox {
            label: label.into(),
            x1: x_start,
            y1: y_start,
            x2: x_start + width,
            y2: y_start + height,
            bg_w,
            bg_h,
        }
    }

    pub fn width(&self) -> u32 {
        self.x2.abs_diff(self.x1)
    }

    pub fn height(&self) -> u32 {
        self.y2.abs_diff(self.y1)
    }

    fn area(&self) -> f64 {
        f64::from(self.width()) * f64::from(self.height())
    }

    fn assert_valid(&self) {
        assert!(
            self.x1 < self.x2,
            "invalid box: x1 ({}) must be < x2 ({})",
            self.x1,
            self.x2
        );
        assert!(
            self.y1 < self.y2,
            "invalid box: y1 ({}) must be < y2 ({})",
            self.y1,
            self.y2
        );
    }
}

/// Overlap metric used to reject candidate placements
#[derive(Copy, Clone, PartialEq, Eq, Debug, Default, ValueEnum)]
pub enum OverlapMetric {
    /// Intersection over the smaller box's area
    #[default]
    Iob,
    /// Intersection over union
    Iou,
}

impl OverlapMetric {
    pub fn measure(self, bb1: &BoundingBox, bb2: &BoundingBox) -> f64 {
        match self {
            OverlapMetric::Iob => calculate_iob(bb1, bb2),
            OverlapMetric::Iou => calculate_iou(bb1, bb2),
        }
    }
}

/// Area of the intersection rectangle, zero when the boxes are disjoint
fn intersection_area(bb1: &BoundingBox, bb2: &BoundingBox) -> f64 {
    bb1.assert_valid();
    bb2.assert_valid();

    let x_left = bb1.x1.max(bb2.x1);
    let y_top = bb1.y1.max(bb2.y1);
    let x_right = bb1.x2.min(bb2.x2);
    let y_bottom = bb1.y2.min(bb2.y2);

    if x_right <= x_left || y_bottom <= y_top {
        return 0.0;
    }

    f64::from(x_right - x_left) * f64::from(y_bottom - y_top)
}

/// Calculate Intersection over Union (IoU) between two bounding boxes
///
/// # Panics
/// If either box has `x1 >= x2` or `y1 >= y2`.
pub fn calculate_iou(bb1: &BoundingBox, bb2: &BoundingBox) -> f64 {
    let inter_area = intersection_area(bb1, bb2);
    if inter_area == 0.0 {
        return 0.0;
    }

    let union_area = bb1.area() + bb2.area() - inter_area;
    inter_area / union_area
}

/// Calculate Intersection over Box (IoB) between two bounding boxes.
///
/// The intersection is divided by each box's own area and the larger ratio
/// wins, so a small box mostly covered by a big one scores high even though
/// its IoU is small.
///
/// # Panics
/// If either box has `x1 >= x2` or `y1 >= y2`.
pub fn calculate_iob(bb1: &BoundingBox, bb2: &BoundingBox) -> f64 {
    let inter_area = intersection_area(bb1, bb2);
    if inter_area == 0.0 {
        return 0.0;
    }

    let iob1 = inter_area / bb1.area();
    let iob2 = inter_area / bb2.area();
    iob1.max(iob2)
}

/// Check whether `candidate` overlaps any of `placed` by more than `threshold`
pub fn check_overlap(
    candidate: &BoundingBox,
    placed: &[BoundingBox],
    metric: OverlapMetric,
    threshold: f64,
) -> bool {
    placed
        .iter()
        .any(|bbox| metric.measure(candidate, bbox) > threshold)
}
