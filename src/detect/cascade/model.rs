use anyhow::Result;
use roxmltree::{Document, Node};
use std::str::FromStr;

use crate::Error;

/*
In-memory form of an OpenCV boosted Haar cascade (the "new" XML layout
written by opencv_traincascade):

  <cascade>
    <stageType>BOOST</stageType> <featureType>HAAR</featureType>
    <width>24</width> <height>24</height>
    <stages> <_> stageThreshold, weakClassifiers/_ {internalNodes, leafValues} </_> </stages>
    <features> <_> <rects> <_>x y w h weight</_> </rects> [<tilted>] </_> </features>
  </cascade>

internalNodes holds 4 numbers per node: left, right, feature index, threshold.
A child index <= 0 points into leafValues at its negation.
 */

#[derive(Debug, Clone)]
pub struct Cascade {
    pub width: u32,
    pub height: u32,
    pub stages: Vec<Stage>,
    pub features: Vec<Feature>,
}

#[derive(Debug, Clone)]
pub struct Stage {
    pub threshold: f32,
    pub classifiers: Vec<WeakClassifier>,
}

#[derive(Debug, Clone)]
pub struct WeakClassifier {
    pub nodes: Vec<TreeNode>,
    pub leaves: Vec<f32>,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeNode {
    pub left: i32,
    pub right: i32,
    pub feature: usize,
    pub threshold: f32,
}

#[derive(Debug, Clone)]
pub struct Feature {
    pub rects: Vec<WeightedRect>,
}

#[derive(Debug, Clone, Copy)]
pub struct WeightedRect {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
    pub weight: f32,
}

impl WeakClassifier {
    /// Walk the tree with `value_of(feature)` and return the reached leaf.
    pub fn evaluate(&self, mut value_of: impl FnMut(usize) -> f32) -> f32 {
        let mut idx = 0i32;
        loop {
            let node = &self.nodes[idx as usize];
            idx = if value_of(node.feature) < node.threshold {
                node.left
            } else {
                node.right
            };
            if idx <= 0 {
                return self.leaves[(-idx) as usize];
            }
        }
    }
}

fn invalid(msg: impl Into<String>) -> anyhow::Error {
    Error::Model(msg.into()).into()
}

fn elements<'a, 'input>(node: Node<'a, 'input>) -> impl Iterator<Item = Node<'a, 'input>> {
    node.children().filter(|n| n.is_element())
}

fn child<'a, 'input>(node: Node<'a, 'input>, name: &str) -> Option<Node<'a, 'input>> {
    elements(node).find(|n| n.has_tag_name(name))
}

fn child_text<'a>(node: Node<'a, '_>, name: &str) -> Result<&'a str> {
    child(node, name)
        .and_then(|n| n.text())
        .map(str::trim)
        .ok_or_else(|| invalid(format!("missing <{name}>")))
}

fn numbers<T: FromStr>(text: &str, what: &str) -> Result<Vec<T>> {
    text.split_whitespace()
        .map(|tok| {
            tok.parse::<T>()
                .map_err(|_| invalid(format!("bad number {tok:?} in {what}")))
        })
        .collect()
}

pub fn parse(xml: &str) -> Result<Cascade> {
    let doc = Document::parse(xml).map_err(|e| invalid(e.to_string()))?;
    let root = doc
        .descendants()
        .find(|n| n.has_tag_name("cascade"))
        .ok_or_else(|| invalid("missing <cascade>"))?;

    let stage_type = child_text(root, "stageType")?;
    if stage_type != "BOOST" {
        return Err(invalid(format!("unsupported stage type {stage_type}")));
    }
    let feature_type = child_text(root, "featureType")?;
    if feature_type != "HAAR" {
        return Err(invalid(format!("unsupported feature type {feature_type}")));
    }

    let width: u32 = child_text(root, "width")?
        .parse()
        .map_err(|_| invalid("bad window width"))?;
    let height: u32 = child_text(root, "height")?
        .parse()
        .map_err(|_| invalid("bad window height"))?;
    if width < 3 || height < 3 {
        return Err(invalid(format!("window {width}x{height} is too small")));
    }

    let features = elements(child(root, "features").ok_or_else(|| invalid("missing <features>"))?)
        .map(parse_feature)
        .collect::<Result<Vec<_>>>()?;

    let stages = elements(child(root, "stages").ok_or_else(|| invalid("missing <stages>"))?)
        .map(parse_stage)
        .collect::<Result<Vec<_>>>()?;

    let cascade = Cascade {
        width,
        height,
        stages,
        features,
    };
    validate(&cascade)?;

    Ok(cascade)
}

fn parse_stage(node: Node) -> Result<Stage> {
    let threshold = numbers::<f32>(child_text(node, "stageThreshold")?, "stageThreshold")?
        .first()
        .copied()
        .ok_or_else(|| invalid("empty stageThreshold"))?;

    let classifiers = elements(
        child(node, "weakClassifiers").ok_or_else(|| invalid("missing <weakClassifiers>"))?,
    )
    .map(parse_weak)
    .collect::<Result<Vec<_>>>()?;

    Ok(Stage {
        threshold,
        classifiers,
    })
}

fn parse_weak(node: Node) -> Result<WeakClassifier> {
    let raw = numbers::<f64>(child_text(node, "internalNodes")?, "internalNodes")?;
    if raw.is_empty() || raw.len() % 4 != 0 {
        return Err(invalid(format!(
            "internalNodes holds {} values, expected groups of 4",
            raw.len()
        )));
    }

    let nodes = raw
        .chunks_exact(4)
        .map(|c| {
            if c[2] < 0. {
                return Err(invalid("negative feature index"));
            }
            Ok(TreeNode {
                left: c[0] as i32,
                right: c[1] as i32,
                feature: c[2] as usize,
                threshold: c[3] as f32,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let leaves = numbers::<f32>(child_text(node, "leafValues")?, "leafValues")?;

    Ok(WeakClassifier { nodes, leaves })
}

fn parse_feature(node: Node) -> Result<Feature> {
    if let Ok(tilted) = child_text(node, "tilted") {
        if tilted != "0" {
            return Err(invalid("tilted features are not supported"));
        }
    }

    let rects = elements(child(node, "rects").ok_or_else(|| invalid("missing <rects>"))?)
        .map(|r| {
            let text = r.text().unwrap_or_default();
            let v = numbers::<f32>(text, "rect")?;
            if v.len() != 5 || v[..4].iter().any(|&n| n < 0.) {
                return Err(invalid(format!("bad feature rect {:?}", text.trim())));
            }
            Ok(WeightedRect {
                x: v[0] as u32,
                y: v[1] as u32,
                w: v[2] as u32,
                h: v[3] as u32,
                weight: v[4],
            })
        })
        .collect::<Result<Vec<_>>>()?;

    if rects.is_empty() {
        return Err(invalid("feature without rects"));
    }

    Ok(Feature { rects })
}

// Reject anything that would index out of bounds during evaluation.
fn validate(cascade: &Cascade) -> Result<()> {
    if cascade.stages.is_empty() {
        return Err(invalid("cascade has no stages"));
    }

    for feature in &cascade.features {
        for r in &feature.rects {
            if r.x + r.w > cascade.width || r.y + r.h > cascade.height {
                return Err(invalid(format!("feature rect {r:?} leaves the window")));
            }
        }
    }

    for stage in &cascade.stages {
        for weak in &stage.classifiers {
            for node in &weak.nodes {
                if node.feature >= cascade.features.len() {
                    return Err(invalid(format!("unknown feature {}", node.feature)));
                }
                for next in [node.left, node.right] {
                    let ok = if next > 0 {
                        (next as usize) < weak.nodes.len()
                    } else {
                        ((-next) as usize) < weak.leaves.len()
                    };
                    if !ok {
                        return Err(invalid(format!("dangling tree index {next}")));
                    }
                }
            }
        }
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// 6x6 window, one stump over a left/right edge feature.
    pub(crate) const EDGE_CASCADE: &str = r#"<?xml version="1.0"?>
<opencv_storage>
<cascade type_id="opencv-cascade-classifier"><stageType>BOOST</stageType>
  <featureType>HAAR</featureType>
  <height>6</height>
  <width>6</width>
  <stageParams>
    <maxWeakCount>1</maxWeakCount></stageParams>
  <featureParams>
    <maxCatCount>0</maxCatCount></featureParams>
  <stageNum>1</stageNum>
  <stages>
    <_>
      <maxWeakCount>1</maxWeakCount>
      <stageThreshold>5.0000000000000000e-01</stageThreshold>
      <weakClassifiers>
        <_>
          <internalNodes>
            0 -1 0 0.</internalNodes>
          <leafValues>
            -1. 1.</leafValues></_></weakClassifiers></_></stages>
  <features>
    <_>
      <rects>
        <_>
          0 0 6 6 -1.</_>
        <_>
          3 0 3 6 2.</_></rects></_></features></cascade>
</opencv_storage>
"#;

    #[test]
    fn parse_edge_cascade() -> Result<()> {
        let cascade = parse(EDGE_CASCADE)?;
        assert_eq!((cascade.width, cascade.height), (6, 6));
        assert_eq!(cascade.stages.len(), 1);
        assert_eq!(cascade.stages[0].threshold, 0.5);
        assert_eq!(cascade.stages[0].classifiers[0].leaves, vec![-1., 1.]);
        assert_eq!(cascade.features[0].rects.len(), 2);
        assert_eq!(cascade.features[0].rects[1].weight, 2.);
        Ok(())
    }

    #[test]
    fn stump_picks_leaf() -> Result<()> {
        let cascade = parse(EDGE_CASCADE)?;
        let weak = &cascade.stages[0].classifiers[0];
        assert_eq!(weak.evaluate(|_| -0.3), -1.);
        assert_eq!(weak.evaluate(|_| 0.3), 1.);
        Ok(())
    }

    #[test]
    fn rejects_lbp() {
        let xml = EDGE_CASCADE.replace("<featureType>HAAR", "<featureType>LBP");
        let err = parse(&xml).unwrap_err();
        assert!(matches!(err.downcast_ref::<Error>(), Some(Error::Model(_))));
    }

    #[test]
    fn rejects_dangling_feature() {
        let xml = EDGE_CASCADE.replace("0 -1 0 0.", "0 -1 3 0.");
        assert!(parse(&xml).is_err());
    }

    #[test]
    fn rejects_garbage() {
        assert!(parse("<opencv_storage><cascade>").is_err());
    }
}
