//! Formula evaluation.
//!
//! [`Recalculator`] rewrites a spreadsheet formula into an `evalexpr`
//! expression whose cell and range references are bound as context
//! variables, then evaluates it. Formulas outside the supported subset fall
//! back to the result cached in the workbook. Each evaluated cell is
//! remembered, so reading a whole sheet evaluates every formula once.
//! [`CachedResults`] skips recalculation entirely.

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
};

use evalexpr::{
    ContextWithMutableFunctions, ContextWithMutableVariables, Function, HashMapContext,
    Value as EvalValue, eval_with_context,
};
use log::{debug, warn};
use serde::{Deserialize, Serialize};

use crate::{
    error::FormulaError,
    workbook::{Cell, CellValue, Position, Sheet},
};

const MAX_RANGE_CELLS: usize = 1_000_000;

/// Reference chains are followed at most this many cells deep in one pass.
/// Longer chains are evaluated from the cut upwards.
const MAX_REFERENCE_DEPTH: usize = 64;

pub trait FormulaEvaluator {
    /// Produces the value of the cell at `position`. Non-formula cells
    /// evaluate to their literal value.
    fn evaluate(
        &self,
        sheet: &Sheet,
        position: Position,
        cell: &Cell,
    ) -> Result<CellValue, FormulaError>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum EvaluationMode {
    /// Recompute supported formulas from the referenced cells
    #[default]
    Recalculate,
    /// Trust the results saved in the workbook
    Cached,
}

impl EvaluationMode {
    /// A fresh evaluator for one sheet.
    pub fn evaluator(self) -> Box<dyn FormulaEvaluator> {
        match self {
            EvaluationMode::Recalculate => Box::new(Recalculator::default()),
            EvaluationMode::Cached => Box::new(CachedResults),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct CachedResults;

impl FormulaEvaluator for CachedResults {
    fn evaluate(
        &self,
        _sheet: &Sheet,
        _position: Position,
        cell: &Cell,
    ) -> Result<CellValue, FormulaError> {
        if cell.is_formula() {
            cached_result(cell)
        } else {
            Ok(cell.value.clone())
        }
    }
}

fn cached_result(cell: &Cell) -> Result<CellValue, FormulaError> {
    match &cell.value {
        CellValue::Blank => Err(FormulaError::NoCachedValue),
        CellValue::Error(code) => Err(FormulaError::CellError(code.clone())),
        other => Ok(other.clone()),
    }
}

/// Recomputes supported formulas. Results are remembered by position, so an
/// instance must only ever see one sheet.
#[derive(Debug)]
pub struct Recalculator {
    results: RefCell<HashMap<Position, Result<CellValue, FormulaError>>>,
    context: RefCell<HashMapContext>,
}

impl Default for Recalculator {
    fn default() -> Self {
        let mut context = HashMapContext::new();
        if let Err(err) = register_functions(&mut context) {
            warn!("Spreadsheet functions unavailable, formulas read cached results: {err}");
        }
        Self {
            results: RefCell::default(),
            context: RefCell::new(context),
        }
    }
}

/// State of one pass through the reference graph.
#[derive(Default)]
struct Walk {
    visiting: HashSet<Position>,
    /// First cell the depth cap stopped at. Results of a cut pass are
    /// provisional and never remembered.
    cut: Option<Position>,
}

impl FormulaEvaluator for Recalculator {
    fn evaluate(
        &self,
        sheet: &Sheet,
        position: Position,
        cell: &Cell,
    ) -> Result<CellValue, FormulaError> {
        let mut pending = Vec::new();
        let mut current = (position, cell);
        loop {
            let mut walk = Walk::default();
            let result = self.evaluate_cell(sheet, current.0, current.1, &mut walk);
            match walk.cut {
                None => match pending.pop() {
                    Some(previous) => current = previous,
                    None => return result,
                },
                Some(cut) => {
                    // every pending cell reaches the cut, so meeting one again is a cycle
                    if cut == current.0 || pending.iter().any(|(at, _)| *at == cut) {
                        return Err(FormulaError::CircularReference(cut.to_string()));
                    }
                    let Some(next) = sheet.cell(cut) else {
                        return result;
                    };
                    pending.push(current);
                    current = (cut, next);
                }
            }
        }
    }
}

impl Recalculator {
    fn evaluate_cell(
        &self,
        sheet: &Sheet,
        position: Position,
        cell: &Cell,
        walk: &mut Walk,
    ) -> Result<CellValue, FormulaError> {
        let Some(expression) = cell.formula.as_deref() else {
            return Ok(cell.value.clone());
        };
        if let Some(result) = self.results.borrow().get(&position) {
            return result.clone();
        }
        if walk.visiting.len() >= MAX_REFERENCE_DEPTH {
            walk.cut.get_or_insert(position);
            return Err(FormulaError::Unsupported(format!(
                "reference chain reaching {position} is deeper than {MAX_REFERENCE_DEPTH} cells"
            )));
        }
        if !walk.visiting.insert(position) {
            return Err(FormulaError::CircularReference(position.to_string()));
        }
        let outcome = self.evaluate_expression(sheet, expression, walk);
        walk.visiting.remove(&position);

        let result = match outcome {
            Err(FormulaError::Unsupported(reason)) => {
                debug!("{position}: using cached result for unsupported formula ({reason})");
                cached_result(cell).map_err(|_| FormulaError::Unsupported(reason))
            }
            other => other,
        }
        .map(|value| match (value, &cell.value) {
            (CellValue::Number(n), CellValue::Date(_)) => CellValue::Date(n),
            (value, _) => value,
        });
        if walk.cut.is_none() {
            self.results.borrow_mut().insert(position, result.clone());
        }
        result
    }

    fn evaluate_expression(
        &self,
        sheet: &Sheet,
        expression: &str,
        walk: &mut Walk,
    ) -> Result<CellValue, FormulaError> {
        let translation = translate(expression)?;
        let mut bindings = Vec::with_capacity(translation.bindings.len());
        for (name, reference) in translation.bindings {
            let value = match reference {
                Reference::Cell(position) => self.cell_binding(sheet, position, walk)?,
                Reference::Range(start, end) => self.range_binding(sheet, start, end, walk)?,
            };
            bindings.push((name, value));
        }

        let mut context = self.context.borrow_mut();
        // a variable keeps its first type, so bindings never carry over
        context.clear_variables();
        for (name, value) in bindings {
            context
                .set_value(name, value)
                .map_err(|err| FormulaError::Evaluation(err.to_string()))?;
        }
        let result = eval_with_context(&translation.expression, &*context)
            .map_err(|err| FormulaError::Evaluation(err.to_string()))?;
        match result {
            EvalValue::Float(f) if f.is_finite() => Ok(CellValue::Number(f)),
            EvalValue::Float(_) => Err(FormulaError::Evaluation("#DIV/0!".to_string())),
            EvalValue::Int(i) => Ok(CellValue::Number(i as f64)),
            EvalValue::String(s) => Ok(CellValue::Text(s)),
            EvalValue::Boolean(b) => Ok(CellValue::Bool(b)),
            EvalValue::Empty => Ok(CellValue::Blank),
            EvalValue::Tuple(_) => Err(FormulaError::Evaluation(
                "formula produced more than one value".to_string(),
            )),
        }
    }

    fn referenced_value(
        &self,
        sheet: &Sheet,
        position: Position,
        walk: &mut Walk,
    ) -> Result<CellValue, FormulaError> {
        match sheet.cell(position) {
            Some(cell) => self.evaluate_cell(sheet, position, cell, walk),
            None => Ok(CellValue::Blank),
        }
    }

    fn cell_binding(
        &self,
        sheet: &Sheet,
        position: Position,
        walk: &mut Walk,
    ) -> Result<EvalValue, FormulaError> {
        Ok(match self.referenced_value(sheet, position, walk)? {
            CellValue::Blank => EvalValue::Float(0.0),
            CellValue::Number(n) | CellValue::Date(n) => EvalValue::Float(n),
            CellValue::Text(s) => EvalValue::String(s),
            CellValue::Bool(b) => EvalValue::Boolean(b),
            CellValue::Error(code) => return Err(FormulaError::CellError(code)),
        })
    }

    /// Ranges only contribute their numbers, like spreadsheet aggregate functions.
    fn range_binding(
        &self,
        sheet: &Sheet,
        start: Position,
        end: Position,
        walk: &mut Walk,
    ) -> Result<EvalValue, FormulaError> {
        let (top, bottom) = (start.row.min(end.row), start.row.max(end.row));
        let (left, right) = (start.col.min(end.col), start.col.max(end.col));
        if (bottom - top + 1).saturating_mul(right - left + 1) > MAX_RANGE_CELLS {
            return Err(FormulaError::Unsupported(format!(
                "range {start}:{end} is too large"
            )));
        }
        let mut values = Vec::new();
        for row in top..=bottom {
            for col in left..=right {
                match self.referenced_value(sheet, Position::new(row, col), walk)? {
                    CellValue::Number(n) | CellValue::Date(n) => values.push(EvalValue::Float(n)),
                    CellValue::Error(code) => return Err(FormulaError::CellError(code)),
                    _ => {}
                }
            }
        }
        Ok(EvalValue::Tuple(values))
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Reference {
    Cell(Position),
    Range(Position, Position),
}

#[derive(Debug, Default)]
struct Translation {
    expression: String,
    bindings: Vec<(String, Reference)>,
}

impl Translation {
    fn bind(&mut self, reference: Reference) {
        let name = format!("ref_{}", self.bindings.len());
        self.expression.push_str(&name);
        self.bindings.push((name, reference));
    }
}

fn translate(formula: &str) -> Result<Translation, FormulaError> {
    let body = formula.trim().trim_start_matches('=');
    let unsupported = |detail: &str| FormulaError::Unsupported(format!("{detail} in '{body}'"));
    let chars = body.chars().collect::<Vec<_>>();
    let mut out = Translation::default();
    let mut idx = 0;

    while idx < chars.len() {
        let ch = chars[idx];
        match ch {
            c if c.is_whitespace() => {
                out.expression.push(c);
                idx += 1;
            }
            '"' => {
                let mut literal = String::new();
                idx += 1;
                loop {
                    match chars.get(idx) {
                        Some('"') if chars.get(idx + 1) == Some(&'"') => {
                            literal.push('"');
                            idx += 2;
                        }
                        Some('"') => {
                            idx += 1;
                            break;
                        }
                        Some(other) => {
                            literal.push(*other);
                            idx += 1;
                        }
                        None => return Err(unsupported("unterminated string")),
                    }
                }
                out.expression.push('"');
                out.expression
                    .push_str(&literal.replace('\\', "\\\\").replace('"', "\\\""));
                out.expression.push('"');
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = idx;
                while idx < chars.len() && (chars[idx].is_ascii_digit() || chars[idx] == '.') {
                    idx += 1;
                }
                if idx < chars.len() && matches!(chars[idx], 'e' | 'E') {
                    idx += 1;
                    if idx < chars.len() && matches!(chars[idx], '+' | '-') {
                        idx += 1;
                    }
                    while idx < chars.len() && chars[idx].is_ascii_digit() {
                        idx += 1;
                    }
                }
                let literal = chars[start..idx].iter().collect::<String>();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| unsupported(&format!("number '{literal}'")))?;
                let mut rendered = value.to_string();
                if !rendered.contains('.') {
                    rendered.push_str(".0");
                }
                out.expression.push_str(&rendered);
            }
            c if c.is_ascii_alphabetic() || c == '$' || c == '_' => {
                let start = idx;
                while idx < chars.len()
                    && (chars[idx].is_ascii_alphanumeric() || matches!(chars[idx], '$' | '_' | '.'))
                {
                    idx += 1;
                }
                let word = chars[start..idx].iter().collect::<String>();
                match chars.get(idx) {
                    Some('(') => out.expression.push_str(function_name(&word).ok_or_else(
                        || unsupported(&format!("function {}", word.to_ascii_uppercase())),
                    )?),
                    Some('!') => return Err(unsupported("reference to another sheet")),
                    Some(':') => {
                        let first = Position::parse_a1(&word)
                            .ok_or_else(|| FormulaError::InvalidReference(word.clone()))?;
                        idx += 1;
                        let end_start = idx;
                        while idx < chars.len()
                            && (chars[idx].is_ascii_alphanumeric() || chars[idx] == '$')
                        {
                            idx += 1;
                        }
                        let second_word = chars[end_start..idx].iter().collect::<String>();
                        let second = Position::parse_a1(&second_word)
                            .ok_or_else(|| FormulaError::InvalidReference(second_word.clone()))?;
                        out.bind(Reference::Range(first, second));
                    }
                    _ => match word.to_ascii_uppercase().as_str() {
                        "TRUE" => out.expression.push_str("true"),
                        "FALSE" => out.expression.push_str("false"),
                        _ => {
                            let position = Position::parse_a1(&word)
                                .ok_or_else(|| unsupported(&format!("name '{word}'")))?;
                            out.bind(Reference::Cell(position));
                        }
                    },
                }
            }
            '<' => {
                match chars.get(idx + 1) {
                    Some('>') => {
                        out.expression.push_str("!=");
                        idx += 1;
                    }
                    Some('=') => {
                        out.expression.push_str("<=");
                        idx += 1;
                    }
                    _ => out.expression.push('<'),
                }
                idx += 1;
            }
            '>' => {
                if chars.get(idx + 1) == Some(&'=') {
                    out.expression.push_str(">=");
                    idx += 1;
                } else {
                    out.expression.push('>');
                }
                idx += 1;
            }
            '=' => {
                out.expression.push_str("==");
                idx += 1;
            }
            '+' | '-' | '*' | '/' | '^' | '(' | ')' | ',' => {
                out.expression.push(ch);
                idx += 1;
            }
            ';' => {
                out.expression.push(',');
                idx += 1;
            }
            other => return Err(unsupported(&format!("operator '{other}'"))),
        }
    }
    Ok(out)
}

fn function_name(name: &str) -> Option<&'static str> {
    Some(match name.to_ascii_uppercase().as_str() {
        "SUM" => "xl_sum",
        "AVERAGE" => "xl_average",
        "MIN" => "xl_min",
        "MAX" => "xl_max",
        "COUNT" => "xl_count",
        "ABS" => "xl_abs",
        "ROUND" => "xl_round",
        _ => return None,
    })
}

fn register_functions(context: &mut HashMapContext) -> Result<(), FormulaError> {
    let registered = |err: evalexpr::EvalexprError| FormulaError::Evaluation(err.to_string());
    context
        .set_function(
            "xl_sum".into(),
            Function::new(|arguments| Ok(EvalValue::Float(numbers(arguments)?.iter().sum()))),
        )
        .map_err(registered)?;

    context
        .set_function(
            "xl_average".into(),
            Function::new(|arguments| {
                let values = numbers(arguments)?;
                if values.is_empty() {
                    return Err(eval_error("#DIV/0!"));
                }
                Ok(EvalValue::Float(
                    values.iter().sum::<f64>() / values.len() as f64,
                ))
            }),
        )
        .map_err(registered)?;

    context
        .set_function(
            "xl_min".into(),
            Function::new(|arguments| {
                let values = numbers(arguments)?;
                Ok(EvalValue::Float(
                    values.into_iter().reduce(f64::min).unwrap_or(0.0),
                ))
            }),
        )
        .map_err(registered)?;

    context
        .set_function(
            "xl_max".into(),
            Function::new(|arguments| {
                let values = numbers(arguments)?;
                Ok(EvalValue::Float(
                    values.into_iter().reduce(f64::max).unwrap_or(0.0),
                ))
            }),
        )
        .map_err(registered)?;

    context
        .set_function(
            "xl_count".into(),
            Function::new(|arguments| Ok(EvalValue::Float(numbers(arguments)?.len() as f64))),
        )
        .map_err(registered)?;

    context
        .set_function(
            "xl_abs".into(),
            Function::new(|arguments| match numbers(arguments)?.as_slice() {
                [value] => Ok(EvalValue::Float(value.abs())),
                other => Err(evalexpr::EvalexprError::wrong_function_argument_amount(
                    other.len(),
                    1,
                )),
            }),
        )
        .map_err(registered)?;

    context
        .set_function(
            "xl_round".into(),
            Function::new(|arguments| match numbers(arguments)?.as_slice() {
                [value, digits] => {
                    let factor = 10f64.powi(*digits as i32);
                    Ok(EvalValue::Float((value * factor).round() / factor))
                }
                other => Err(evalexpr::EvalexprError::wrong_function_argument_amount(
                    other.len(),
                    2,
                )),
            }),
        )
        .map_err(registered)?;
    Ok(())
}

/// Flattens nested argument tuples (ranges arrive as tuples) into numbers.
fn numbers(arguments: &EvalValue) -> Result<Vec<f64>, evalexpr::EvalexprError> {
    let mut collected = Vec::new();
    collect_numbers(arguments, &mut collected)?;
    Ok(collected)
}

fn collect_numbers(
    value: &EvalValue,
    collected: &mut Vec<f64>,
) -> Result<(), evalexpr::EvalexprError> {
    match value {
        EvalValue::Float(f) => collected.push(*f),
        EvalValue::Int(i) => collected.push(*i as f64),
        EvalValue::Boolean(b) => collected.push(if *b { 1.0 } else { 0.0 }),
        EvalValue::Tuple(values) => {
            for inner in values {
                collect_numbers(inner, collected)?;
            }
        }
        EvalValue::Empty => {}
        EvalValue::String(s) => {
            return Err(eval_error(&format!("#VALUE! ('{s}' is not a number)")));
        }
    }
    Ok(())
}

fn eval_error(message: &str) -> evalexpr::EvalexprError {
    evalexpr::EvalexprError::CustomMessage(message.to_string())
}
