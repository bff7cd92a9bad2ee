use std::collections::HashMap;
use std::fmt::Display;

use crate::error::{Error, Result};
use crate::storage::tuple::{Field, TdItem, Tuple, TupleDesc, Type};
use crate::storage::DbIterator;
use super::OpIterator;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AggregateOp {
    Min,
    Max,
    Sum,
    Avg,
    Count,
    /// Emits the sum and the count as two fields, so partial results can be combined later.
    SumCount,
    /// Averages partial results: reads a sum at the aggregate field and a count right after it.
    ScAvg,
}

impl Display for AggregateOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Sum => "sum",
            AggregateOp::Avg => "avg",
            AggregateOp::Count => "count",
            AggregateOp::SumCount => "sum_count",
            AggregateOp::ScAvg => "sc_avg",
        };
        write!(f, "{}", name)
    }
}

/// Running state of one group.
#[derive(Default)]
struct Accumulator {
    count: i64,
    sum: i64,
    min: Option<i32>,
    max: Option<i32>,
}

impl Accumulator {
    fn add(&mut self, field: &Field) {
        self.count += 1;
        if let Field::Int(v) = field {
            self.sum += *v as i64;
            self.min = Some(self.min.map_or(*v, |m| m.min(*v)));
            self.max = Some(self.max.map_or(*v, |m| m.max(*v)));
        }
    }

    /// Folds in a partial (sum, count) pair produced by SumCount.
    fn add_partial(&mut self, sum: &Field, count: &Field) -> Result<()> {
        match (sum, count) {
            (Field::Int(sum), Field::Int(count)) => {
                self.sum += *sum as i64;
                self.count += *count as i64;
                Ok(())
            }
            _ => Err(Error::Value(format!("Partial sum and count must be ints, got {} and {}", sum, count))),
        }
    }

    fn result(&self, op: AggregateOp) -> Result<Vec<Field>> {
        let values = match op {
            AggregateOp::Count => vec![self.count],
            AggregateOp::Sum => vec![self.sum],
            // Integer division, truncating toward zero.
            AggregateOp::Avg | AggregateOp::ScAvg => vec![self.sum / self.count.max(1)],
            AggregateOp::Min => vec![self.min.unwrap_or_default() as i64],
            AggregateOp::Max => vec![self.max.unwrap_or_default() as i64],
            AggregateOp::SumCount => vec![self.sum, self.count],
        };
        values
            .into_iter()
            .map(|value| {
                i32::try_from(value)
                    .map(Field::Int)
                    .map_err(|_| Error::Value(format!("{} of {} overflows an int", op, value)))
            })
            .collect()
    }
}

enum State {
    Unopened,
    Open { results: Vec<Tuple>, cursor: usize },
    Exhausted,
}

/// Computes one aggregate over a field of its child, optionally grouped by another field.
///
/// The child is drained when the operator is opened. Output tuples are `(group, value)` with
/// grouping and `(value)` without; groups appear in the order they were first seen. An empty
/// input produces no tuples. SumCount outputs `(group, sum, count)`, and ScAvg consumes such
/// pairs to produce the overall average.
pub struct Aggregate {
    child: OpIterator,
    field: usize,
    group_by: Option<usize>,
    op: AggregateOp,
    desc: TupleDesc,
    state: State,
}

impl Aggregate {
    /// Fails if a field index is out of range, or op is anything but Count over a string field.
    /// ScAvg also needs an int count at field + 1.
    pub fn new(child: OpIterator, field: usize, group_by: Option<usize>, op: AggregateOp) -> Result<Self> {
        let child_desc = child.tuple_desc();
        let field_type = child_desc.field_type(field)?;
        if field_type == Type::Str && op != AggregateOp::Count {
            return Err(Error::Value(format!("Cannot compute {} over a string field", op)));
        }
        if op == AggregateOp::ScAvg && child_desc.field_type(field + 1)? != Type::Int {
            return Err(Error::Value(format!("{} needs an int count after field {}", op, field)));
        }

        let mut items = Vec::new();
        if let Some(group_by) = group_by {
            items.push(TdItem {
                field_type: child_desc.field_type(group_by)?,
                name: child_desc.field_name(group_by)?.map(String::from),
            });
        }
        let name = child_desc.field_name(field)?.unwrap_or("*");
        let outputs = match op {
            AggregateOp::SumCount => vec![format!("sum({})", name), format!("count({})", name)],
            AggregateOp::ScAvg => vec![format!("avg({})", name)],
            op => vec![format!("{}({})", op, name)],
        };
        items.extend(outputs.into_iter().map(|name| TdItem { field_type: Type::Int, name: Some(name) }));
        let desc = TupleDesc::from_items(items);
        Ok(Self { child, field, group_by, op, desc, state: State::Unopened })
    }

    pub fn op(&self) -> AggregateOp {
        self.op
    }

    pub fn field(&self) -> usize {
        self.field
    }

    pub fn group_by(&self) -> Option<usize> {
        self.group_by
    }

    /// Drains the child into per-group accumulators, keeping first-seen group order.
    fn compute(&mut self) -> Result<Vec<Tuple>> {
        let mut index: HashMap<Option<Field>, usize> = HashMap::new();
        let mut groups: Vec<(Option<Field>, Accumulator)> = Vec::new();
        while let Some(tuple) = self.child.next()? {
            let key = match self.group_by {
                Some(g) => Some(tuple.field(g)?.clone()),
                None => None,
            };
            let i = *index.entry(key.clone()).or_insert_with(|| {
                groups.push((key, Accumulator::default()));
                groups.len() - 1
            });
            let acc = &mut groups[i].1;
            match self.op {
                AggregateOp::ScAvg => acc.add_partial(tuple.field(self.field)?, tuple.field(self.field + 1)?)?,
                _ => acc.add(tuple.field(self.field)?),
            }
        }

        groups
            .into_iter()
            .map(|(key, acc)| {
                let mut fields: Vec<Field> = key.into_iter().collect();
                fields.extend(acc.result(self.op)?);
                Ok(Tuple::new(fields))
            })
            .collect()
    }
}

impl DbIterator for Aggregate {
    fn open(&mut self) -> Result<()> {
        self.child.open()?;
        let results = self.compute()?;
        self.state = State::Open { results, cursor: 0 };
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Tuple>> {
        let next = match &mut self.state {
            State::Unopened => return Err(Error::Value("Aggregate is not open".into())),
            State::Exhausted => None,
            State::Open { results, cursor } => {
                let tuple = results.get(*cursor).cloned();
                *cursor += 1;
                tuple
            }
        };
        if next.is_none() {
            self.state = State::Exhausted;
        }
        Ok(next)
    }

    fn close(&mut self) {
        self.child.close();
        self.state = State::Unopened;
    }

    fn tuple_desc(&self) -> &TupleDesc {
        &self.desc
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::TupleList;

    fn input() -> OpIterator {
        let desc = TupleDesc::new(&[Type::Str, Type::Int], &["name", "score"]);
        let rows = [("b", 3), ("a", 10), ("b", -7), ("c", 4), ("a", 5)];
        let tuples = rows.iter().map(|(n, s)| Tuple::new(vec![(*n).into(), (*s).into()])).collect();
        Box::new(TupleList::new(desc, tuples))
    }

    fn run(field: usize, group_by: Option<usize>, op: AggregateOp) -> Result<Vec<Tuple>> {
        let mut agg = Aggregate::new(input(), field, group_by, op)?;
        agg.open()?;
        agg.collect_all()
    }

    fn pairs(tuples: &[Tuple]) -> Vec<(String, i32)> {
        tuples
            .iter()
            .map(|t| (t.fields()[0].to_string(), t.fields()[1].as_int().unwrap_or(i32::MIN)))
            .collect()
    }

    fn owned(rows: &[(&str, i32)]) -> Vec<(String, i32)> {
        rows.iter().map(|(n, v)| (n.to_string(), *v)).collect()
    }

    #[test]
    fn test_grouped_ops() -> Result<()> {
        assert_eq!(owned(&[("b", 2), ("a", 2), ("c", 1)]), pairs(&run(1, Some(0), AggregateOp::Count)?));
        assert_eq!(owned(&[("b", -4), ("a", 15), ("c", 4)]), pairs(&run(1, Some(0), AggregateOp::Sum)?));
        assert_eq!(owned(&[("b", -7), ("a", 5), ("c", 4)]), pairs(&run(1, Some(0), AggregateOp::Min)?));
        assert_eq!(owned(&[("b", 3), ("a", 10), ("c", 4)]), pairs(&run(1, Some(0), AggregateOp::Max)?));
        assert_eq!(owned(&[("b", -2), ("a", 7), ("c", 4)]), pairs(&run(1, Some(0), AggregateOp::Avg)?));
        Ok(())
    }

    #[test]
    fn test_ungrouped() -> Result<()> {
        assert_eq!(vec![Tuple::new(vec![15.into()])], run(1, None, AggregateOp::Sum)?);
        assert_eq!(vec![Tuple::new(vec![5.into()])], run(0, None, AggregateOp::Count)?);

        let agg = Aggregate::new(input(), 1, None, AggregateOp::Avg)?;
        assert_eq!(1, agg.tuple_desc().num_fields());
        assert_eq!(Some("avg(score)"), agg.tuple_desc().field_name(0)?);
        Ok(())
    }

    #[test]
    fn test_sum_count() -> Result<()> {
        let agg = Aggregate::new(input(), 1, Some(0), AggregateOp::SumCount)?;
        let desc = agg.tuple_desc();
        assert_eq!(3, desc.num_fields());
        assert_eq!(Some("name"), desc.field_name(0)?);
        assert_eq!(Some("sum(score)"), desc.field_name(1)?);
        assert_eq!(Some("count(score)"), desc.field_name(2)?);

        let row = |n: &str, s: i32, c: i32| Tuple::new(vec![n.into(), s.into(), c.into()]);
        assert_eq!(
            vec![row("b", -4, 2), row("a", 15, 2), row("c", 4, 1)],
            run(1, Some(0), AggregateOp::SumCount)?
        );

        let ungrouped = Aggregate::new(input(), 1, None, AggregateOp::SumCount)?;
        assert_eq!(2, ungrouped.tuple_desc().num_fields());
        assert_eq!(vec![Tuple::new(vec![15.into(), 5.into()])], run(1, None, AggregateOp::SumCount)?);
        Ok(())
    }

    #[test]
    fn test_sc_avg_combines_partials() -> Result<()> {
        // Scenario: two partitions computed sum and count separately.
        let desc = TupleDesc::new(&[Type::Str, Type::Int, Type::Int], &["name", "sum", "count"]);
        let partials = vec![
            Tuple::new(vec!["a".into(), 10.into(), 1.into()]),
            Tuple::new(vec!["b".into(), 3.into(), 1.into()]),
            Tuple::new(vec!["a".into(), 5.into(), 1.into()]),
            Tuple::new(vec!["b".into(), (-7).into(), 1.into()]),
            Tuple::new(vec!["c".into(), 4.into(), 1.into()]),
        ];
        let mut grouped = Aggregate::new(
            Box::new(TupleList::new(desc.clone(), partials.clone())),
            1,
            Some(0),
            AggregateOp::ScAvg,
        )?;
        assert_eq!(2, grouped.tuple_desc().num_fields());
        assert_eq!(Some("avg(sum)"), grouped.tuple_desc().field_name(1)?);
        grouped.open()?;
        assert_eq!(owned(&[("a", 7), ("b", -2), ("c", 4)]), pairs(&grouped.collect_all()?));

        let mut ungrouped =
            Aggregate::new(Box::new(TupleList::new(desc, partials)), 1, None, AggregateOp::ScAvg)?;
        ungrouped.open()?;
        assert_eq!(vec![Tuple::new(vec![3.into()])], ungrouped.collect_all()?);
        Ok(())
    }

    #[test]
    fn test_sc_avg_over_sum_count() -> Result<()> {
        // The grouped SumCount output feeds an ungrouped ScAvg: (15 + -4 + 4) / 5.
        let sum_count = Aggregate::new(input(), 1, Some(0), AggregateOp::SumCount)?;
        let mut avg = Aggregate::new(Box::new(sum_count), 1, None, AggregateOp::ScAvg)?;
        avg.open()?;
        assert_eq!(vec![Tuple::new(vec![3.into()])], avg.collect_all()?);

        let sum_count = Aggregate::new(input(), 1, Some(0), AggregateOp::SumCount)?;
        let mut avg = Aggregate::new(Box::new(sum_count), 1, Some(0), AggregateOp::ScAvg)?;
        avg.open()?;
        assert_eq!(owned(&[("b", -2), ("a", 7), ("c", 4)]), pairs(&avg.collect_all()?));
        Ok(())
    }

    #[test]
    fn test_sc_avg_needs_int_count() {
        // score is the last field, so there is no count after it.
        assert!(Aggregate::new(input(), 1, None, AggregateOp::ScAvg).is_err());
        let desc = TupleDesc::new(&[Type::Int, Type::Str], &["sum", "note"]);
        let child = Box::new(TupleList::new(desc, vec![]));
        assert!(matches!(Aggregate::new(child, 0, None, AggregateOp::ScAvg), Err(Error::Value(_))));
    }

    #[test]
    fn test_string_field_only_counts() {
        assert!(matches!(Aggregate::new(input(), 0, None, AggregateOp::Sum), Err(Error::Value(_))));
        assert!(Aggregate::new(input(), 0, Some(1), AggregateOp::Count).is_ok());
    }

    #[test]
    fn test_state_machine() -> Result<()> {
        let mut agg = Aggregate::new(input(), 1, Some(0), AggregateOp::Max)?;
        assert!(agg.next().is_err());

        agg.open()?;
        assert_eq!(3, agg.collect_all()?.len());
        assert_eq!(None, agg.next()?);

        agg.rewind()?;
        assert_eq!(owned(&[("b", 3), ("a", 10), ("c", 4)]), pairs(&agg.collect_all()?));
        agg.close();
        assert!(agg.next().is_err());
        Ok(())
    }

    #[test]
    fn test_empty_input() -> Result<()> {
        let child = Box::new(TupleList::new(TupleDesc::from_types(&[Type::Int]), vec![]));
        let mut agg = Aggregate::new(child, 0, None, AggregateOp::Count)?;
        agg.open()?;
        assert_eq!(None, agg.next()?);
        Ok(())
    }
}
