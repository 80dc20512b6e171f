use pest_derive::Parser;

#[derive(Parser)]
#[grammar = "tessql.pest"]
pub struct TessqlParser;

#[cfg(test)]
mod tests {
    use super::*;
    use pest::*;

    #[test]
    fn test_literal_comparison() {
        parses_to! {
            parser: TessqlParser,
            input: "a=1",
            rule: Rule::Selection,
            tokens: [
                Selection(0, 3, [
                    Expr(0, 3, [
                        Conjunction(0, 3, [
                            Negation(0, 3, [
                                Comparison(0, 3, [Field(0, 1, [Identifier(0, 1)]), Eq(1, 2), Integer(2, 3)])
                            ])
                        ])
                    ]),
                    EOI(3, 3)
                ])
            ]
        };
    }

    #[test]
    fn test_method_call() {
        parses_to! {
            parser: TessqlParser,
            input: "name.contains('x')",
            rule: Rule::Selection,
            tokens: [
                Selection(0, 18, [
                    Expr(0, 18, [
                        Conjunction(0, 18, [
                            Negation(0, 18, [
                                Call(0, 18, [
                                    Field(0, 4, [Identifier(0, 4)]),
                                    Identifier(5, 13),
                                    SingleQuoted(14, 17, [StringInner(15, 16)])
                                ])
                            ])
                        ])
                    ]),
                    EOI(18, 18)
                ])
            ]
        };
    }

    #[test]
    fn test_keywords_as_identifiers() {
        let pairs = TessqlParser::parse(Rule::Selection, "order = 1 ORDER BY limit").unwrap();
        let selection = pairs.into_iter().next().unwrap();
        let rules: Vec<Rule> = selection.into_inner().map(|p| p.as_rule()).collect();
        assert_eq!(rules, vec![Rule::Expr, Rule::OrderByClause, Rule::EOI]);
    }

    #[test]
    fn test_rejects_dangling_operator() {
        assert!(TessqlParser::parse(Rule::Selection, "a = ").is_err());
        assert!(TessqlParser::parse(Rule::Selection, "a = 1 AND").is_err());
    }
}
