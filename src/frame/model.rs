//! The declarative tree of alternative implementations an ExecFrame chooses
//! among, and the interpreter that walks it.

use crate::{EngineError, FrameId, Tag};
use std::collections::VecDeque;

/// A callable bound to a `Bind` leaf by the host application before a frame
/// runs. Single-shot: cleared immediately after invocation.
pub enum CallerFn {
    Native(Box<dyn FnMut()>),
    /// Used by the `capi` bridge, which can only hand over a raw fn pointer.
    Extern(extern "C" fn()),
}

impl CallerFn {
    fn call(&mut self) {
        match self {
            CallerFn::Native(f) => f(),
            CallerFn::Extern(f) => f(),
        }
    }
}

/// A `Bind` leaf's work-item slot.
#[derive(Default)]
pub struct Caller {
    bound: Option<CallerFn>,
}

impl Caller {
    pub fn bind(&mut self, f: CallerFn) {
        self.bound = Some(f);
    }

    fn take_and_call(&mut self) -> bool {
        match self.bound.take() {
            Some(mut f) => {
                f.call();
                true
            }
            None => false,
        }
    }
}

/// An expression tree describing the possible implementations of a region.
pub enum Model {
    Nop,
    Bind(usize),
    Sequence(Vec<Model>),
    Select {
        var_id: usize,
        children: Vec<Model>,
        priorities: Option<Vec<i64>>,
        default_index: Option<usize>,
        initial_frs_coeff: Option<f64>,
    },
}

/// One entry of a decision-vector schema, recorded at the first occurrence
/// of a `Select` node's `var_id`.
#[derive(Debug, Clone, PartialEq)]
pub struct VarSchema {
    pub var_id: usize,
    pub num_children: usize,
    pub priorities: Vec<i64>,
    pub default_index: usize,
    pub initial_frs_coeff: f64,
}

/// The ordered list of decision variables a Model tree contains, in first
/// occurrence order under a breadth-first walk.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DecisionSchema {
    pub vars: Vec<VarSchema>,
}

impl DecisionSchema {
    pub fn index_of(&self, var_id: usize) -> Option<usize> {
        self.vars.iter().position(|v| v.var_id == var_id)
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }

    /// Total size of the tag space, the product of every variable's radix.
    pub fn tag_space(&self) -> i64 {
        self.vars.iter().map(|v| v.num_children as i64).product::<i64>().max(1)
    }

    /// Mixed-radix encode: variable 0 is the least significant digit.
    pub fn encode(&self, choices: &[usize]) -> Tag {
        let mut tag: Tag = 0;
        for (var, &choice) in self.vars.iter().zip(choices).rev() {
            tag = tag * var.num_children as i64 + choice as i64;
        }
        tag
    }

    pub fn decode(&self, mut tag: Tag) -> Vec<usize> {
        let mut choices = vec![0usize; self.vars.len()];
        for (i, var) in self.vars.iter().enumerate() {
            let radix = var.num_children as i64;
            choices[i] = (tag % radix) as usize;
            tag /= radix;
        }
        choices
    }
}

/// Walk `root` breadth-first, recording the decision-variable schema and
/// checking every repeated `var_id` agrees with its first occurrence.
pub fn extract_decision_schema(root: &Model) -> Result<DecisionSchema, EngineError> {
    let mut schema = DecisionSchema::default();
    let mut queue: VecDeque<&Model> = VecDeque::new();
    queue.push_back(root);

    while let Some(node) = queue.pop_front() {
        match node {
            Model::Nop | Model::Bind(_) => {}
            Model::Sequence(children) => queue.extend(children.iter()),
            Model::Select { var_id, children, priorities, default_index, initial_frs_coeff } => {
                let priorities = priorities.clone().unwrap_or_else(|| vec![0; children.len()]);
                let default_index = default_index.unwrap_or(0);
                let initial_frs_coeff = initial_frs_coeff.unwrap_or(0.0);

                match schema.index_of(*var_id) {
                    None => schema.vars.push(VarSchema {
                        var_id: *var_id,
                        num_children: children.len(),
                        priorities,
                        default_index,
                        initial_frs_coeff,
                    }),
                    Some(i) => {
                        let existing = &schema.vars[i];
                        let conflict = if existing.num_children != children.len() {
                            Some("child count mismatch")
                        } else if existing.priorities != priorities {
                            Some("priority vector mismatch")
                        } else if existing.default_index != default_index {
                            Some("default index mismatch")
                        } else if (existing.initial_frs_coeff - initial_frs_coeff).abs() > 1e-12 {
                            Some("initial FRS coefficient mismatch")
                        } else {
                            None
                        };
                        if let Some(reason) = conflict {
                            #[cfg(feature = "diagnostics")]
                            log::warn!("model schema conflict for var #{var_id}: {reason}");
                            return Err(EngineError::ModelSchemaError { var_id: *var_id, reason });
                        }
                    }
                }
                queue.extend(children.iter());
            }
        }
    }
    Ok(schema)
}

/// Walk `root`, picking `Select` children per `tags` (indexed against
/// `schema`) and invoking bound work-items.
pub fn run_model(frame_id: FrameId, root: &Model, schema: &DecisionSchema, choices: &[usize], callers: &mut [Caller]) -> Result<(), EngineError> {
    match root {
        Model::Nop => Ok(()),
        Model::Bind(caller_idx) => {
            let caller = callers.get_mut(*caller_idx).ok_or(EngineError::UnboundCaller(frame_id))?;
            if caller.take_and_call() {
                Ok(())
            } else {
                Err(EngineError::UnboundCaller(frame_id))
            }
        }
        Model::Sequence(children) => {
            for child in children {
                run_model(frame_id, child, schema, choices, callers)?;
            }
            Ok(())
        }
        Model::Select { var_id, children, .. } => {
            let index = schema.index_of(*var_id).ok_or(EngineError::ModelSchemaError { var_id: *var_id, reason: "variable absent from schema" })?;
            let choice = choices[index];
            run_model(frame_id, &children[choice], schema, choices, callers)
        }
    }
}

/// Holds the Model, its extracted schema, and the per-invocation tunables
/// the spec groups under a Select/ExecFrame.
pub struct ExecFrame {
    pub model: Model,
    pub schema: DecisionSchema,
    pub stickiness_length: u32,
    pub force_default_choice: bool,
    pub force_fixed_frs_coefficient: bool,
    pub callers: Vec<Caller>,
}

impl ExecFrame {
    pub fn new(model: Model, num_callers: usize, stickiness_length: u32) -> Result<Self, EngineError> {
        let schema = extract_decision_schema(&model)?;
        Ok(Self {
            model,
            schema,
            stickiness_length,
            force_default_choice: false,
            force_fixed_frs_coefficient: false,
            callers: (0..num_callers).map(|_| Caller::default()).collect(),
        })
    }

    pub fn run(&mut self, frame_id: FrameId, tag: Tag) -> Result<(), EngineError> {
        let choices = self.schema.decode(tag);
        run_model(frame_id, &self.model, &self.schema, &choices, &mut self.callers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn select(var_id: usize, n: usize) -> Model {
        Model::Select { var_id, children: (0..n).map(|_| Model::Nop).collect(), priorities: None, default_index: None, initial_frs_coeff: None }
    }

    #[test]
    fn schema_extraction_agrees_on_repeats() {
        let model = Model::Sequence(vec![select(0, 3), select(1, 2), select(0, 3)]);
        let schema = extract_decision_schema(&model).unwrap();
        assert_eq!(schema.len(), 2);
    }

    #[test]
    fn schema_extraction_rejects_conflicting_shape() {
        let model = Model::Sequence(vec![select(0, 3), select(0, 4)]);
        assert!(matches!(extract_decision_schema(&model), Err(EngineError::ModelSchemaError { .. })));
    }

    #[test]
    fn decision_vector_round_trip_p8() {
        let model = Model::Sequence(vec![select(0, 3), select(1, 4), select(2, 2)]);
        let schema = extract_decision_schema(&model).unwrap();
        for a in 0..3 {
            for b in 0..4 {
                for c in 0..2 {
                    let choices = vec![a, b, c];
                    let tag = schema.encode(&choices);
                    assert_eq!(schema.decode(tag), choices);
                }
            }
        }
    }

    #[test]
    fn bind_without_work_item_raises() {
        let model = Model::Bind(0);
        let schema = DecisionSchema::default();
        let mut callers = vec![Caller::default()];
        let err = run_model(7, &model, &schema, &[], &mut callers).unwrap_err();
        assert_eq!(err, EngineError::UnboundCaller(7));
    }

    #[test]
    fn bind_is_single_shot() {
        let model = Model::Bind(0);
        let schema = DecisionSchema::default();
        let mut callers = vec![Caller::default()];
        let calls = std::rc::Rc::new(std::cell::Cell::new(0));
        let calls2 = calls.clone();
        callers[0].bind(CallerFn::Native(Box::new(move || calls2.set(calls2.get() + 1))));
        run_model(7, &model, &schema, &[], &mut callers).unwrap();
        assert_eq!(calls.get(), 1);
        assert!(run_model(7, &model, &schema, &[], &mut callers).is_err());
    }
}
